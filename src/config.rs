use crate::error::ConfigError;
use std::time::Duration;

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub ctp_project_key: String,
    pub ctp_client_id: String,
    pub ctp_client_secret: String,
    pub ctp_api_url: String,
    pub ctp_auth_url: String,
    pub powerboard_live_url: String,
    pub powerboard_sandbox_url: String,
    pub widget_url: String,
    pub widget_test_url: String,
    pub widget_type_sdk: String,
    pub credentials_encryption_key: Option<String>,
    pub merchant_config_ttl: Duration,
    pub fraud_cache_ttl: Duration,
    pub gateway_timeout: Duration,
    pub concurrency_max_attempts: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("ctp_project_key", &self.ctp_project_key)
            .field("ctp_api_url", &self.ctp_api_url)
            .field("powerboard_live_url", &self.powerboard_live_url)
            .field("powerboard_sandbox_url", &self.powerboard_sandbox_url)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `from_env` wraps
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };
        let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            bind_addr: or_default("BIND_ADDR", "0.0.0.0:8080"),
            ctp_project_key: required("CTP_PROJECT_KEY")?,
            ctp_client_id: required("CTP_CLIENT_ID")?,
            ctp_client_secret: required("CTP_CLIENT_SECRET")?,
            ctp_api_url: or_default("CTP_API_URL", "https://api.europe-west1.gcp.commercetools.com"),
            ctp_auth_url: or_default("CTP_AUTH_URL", "https://auth.europe-west1.gcp.commercetools.com"),
            powerboard_live_url: or_default("POWERBOARD_API_LIVE_URL", "https://api.powerboard.commbank.com.au"),
            powerboard_sandbox_url: or_default(
                "POWERBOARD_API_SANDBOX_URL",
                "https://api.preproduction.powerboard.commbank.com.au",
            ),
            widget_url: or_default("POWERBOARD_WIDGET_URL", "https://widget.powerboard.commbank.com.au/sdk/latest/widget.umd.min.js"),
            widget_test_url: or_default(
                "POWERBOARD_WIDGET_TEST_URL",
                "https://widget.preproduction.powerboard.commbank.com.au/sdk/latest/widget.umd.min.js",
            ),
            widget_type_sdk: or_default("POWERBOARD_WIDGET_TYPE_SDK", "sandbox"),
            credentials_encryption_key: lookup("CREDENTIALS_ENCRYPTION_KEY").filter(|v| !v.is_empty()),
            merchant_config_ttl: Duration::from_secs(parse_number(&lookup, "MERCHANT_CONFIG_TTL_SECS", 300)?),
            fraud_cache_ttl: Duration::from_secs(parse_number(&lookup, "FRAUD_CACHE_TTL_SECS", 86_400)?),
            gateway_timeout: Duration::from_millis(parse_number(&lookup, "GATEWAY_TIMEOUT_MS", 10_000)?),
            concurrency_max_attempts: parse_number(&lookup, "CONCURRENCY_MAX_ATTEMPTS", 3)?.max(1) as u32,
        })
    }
}

fn parse_number<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("expected a non-negative integer, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_platform_credentials_are_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[("CTP_PROJECT_KEY", "p")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("CTP_CLIENT_ID")));
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("CTP_PROJECT_KEY", "p"),
            ("CTP_CLIENT_ID", "id"),
            ("CTP_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.merchant_config_ttl, Duration::from_secs(300));
        assert_eq!(cfg.fraud_cache_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.concurrency_max_attempts, 3);
        assert!(cfg.credentials_encryption_key.is_none());
    }

    #[test]
    fn rejects_non_numeric_ttl() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("CTP_PROJECT_KEY", "p"),
            ("CTP_CLIENT_ID", "id"),
            ("CTP_CLIENT_SECRET", "secret"),
            ("FRAUD_CACHE_TTL_SECS", "a day"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "FRAUD_CACHE_TTL_SECS", .. }));
    }
}
