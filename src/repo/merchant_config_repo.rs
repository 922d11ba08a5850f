use crate::commerce::{CommercePlatform, CustomObject};
use crate::crypto::{decrypt_credential, CredentialKey};
use crate::domain::merchant_config::{ConnectionProfile, MerchantConfig};
use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const CONFIG_CONTAINER: &str = "powerboardConfigContainer";

const ENCRYPTED_FIELDS: [&str; 3] = [
    "credentials_access_key",
    "credentials_public_key",
    "credentials_secret_key",
];

#[derive(Clone)]
pub struct MerchantConfigRepo {
    pub commerce: Arc<dyn CommercePlatform>,
    pub credential_key: Option<CredentialKey>,
    /// Platform client secret; decodes credentials saved by the old back-office.
    pub legacy_secret: String,
    pub live_url: String,
    pub sandbox_url: String,
}

impl MerchantConfigRepo {
    pub async fn load(&self) -> Result<MerchantConfig, ConfigError> {
        let objects = self.commerce.list_custom_objects(CONFIG_CONTAINER).await?;
        let mut config = assemble(objects, self.credential_key.as_ref(), &self.legacy_secret)?;
        config.live_url = self.live_url.clone();
        config.sandbox_url = self.sandbox_url.clone();
        tracing::debug!(sandbox_mode = config.sandbox_mode(), "merchant configuration loaded");
        Ok(config)
    }
}

/// Builds the configuration from the container's objects. When a group was
/// saved more than once the highest version wins.
pub fn assemble(
    mut objects: Vec<CustomObject>,
    key: Option<&CredentialKey>,
    legacy_secret: &str,
) -> Result<MerchantConfig, ConfigError> {
    objects.sort_by_key(|o| o.version);
    let mut groups: Map<String, Value> = Map::new();
    for object in objects {
        groups.insert(object.key, object.value);
    }
    if !groups.contains_key("live") && !groups.contains_key("sandbox") {
        return Err(ConfigError::MerchantConfig(format!(
            "no live or sandbox group in {CONFIG_CONTAINER}"
        )));
    }

    let mut profile = |name: &str| -> Result<ConnectionProfile, ConfigError> {
        let mut raw = match groups.remove(name) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for field in ENCRYPTED_FIELDS {
            let Some(stored) = raw.get(field).and_then(Value::as_str).filter(|v| !v.is_empty()) else {
                continue;
            };
            let plain = decrypt_credential(key, legacy_secret, stored)?;
            raw.insert(field.to_string(), Value::String(plain));
        }
        Ok(ConnectionProfile::new(raw))
    };

    let live = profile("live")?;
    let sandbox = profile("sandbox")?;
    let widget = match groups.remove("widget") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    Ok(MerchantConfig {
        live,
        sandbox,
        widget,
        ..MerchantConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_credential;
    use serde_json::json;

    fn object(key: &str, version: i64, value: Value) -> CustomObject {
        CustomObject {
            container: CONFIG_CONTAINER.to_string(),
            key: key.to_string(),
            value,
            version,
            created_at: None,
            last_modified_at: None,
        }
    }

    #[test]
    fn decrypts_credentials_of_both_groups() {
        let key = CredentialKey::from_bytes(&[1u8; 32]).unwrap();
        let sealed = encrypt_credential(&key, "sk_sandbox").unwrap();
        let config = assemble(
            vec![
                object("live", 1, json!({"credentials_type": "credentials"})),
                object(
                    "sandbox",
                    1,
                    json!({"sandbox_mode": "Yes", "credentials_type": "credentials", "credentials_secret_key": sealed}),
                ),
            ],
            Some(&key),
            "client-secret",
        )
        .unwrap();
        assert!(config.sandbox_mode());
        assert_eq!(config.active().get("credentials_secret_key"), Some("sk_sandbox"));
    }

    #[test]
    fn newest_version_of_a_group_wins() {
        let config = assemble(
            vec![
                object("live", 5, json!({"card_use_on_checkout": "Yes"})),
                object("live", 2, json!({"card_use_on_checkout": "No"})),
            ],
            None,
            "s",
        )
        .unwrap();
        assert!(config.live.card().use_on_checkout);
    }

    #[test]
    fn missing_groups_are_a_configuration_error() {
        let err = assemble(vec![object("widget", 1, json!({}))], None, "s").unwrap_err();
        assert!(matches!(err, ConfigError::MerchantConfig(_)));
    }
}
