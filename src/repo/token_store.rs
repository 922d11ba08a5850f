use crate::commerce::{CommercePlatform, Customer};
use crate::domain::payment::{TypeReference, UpdateAction};
use crate::domain::vault::{StoredToken, VaultTokenData};
use crate::error::CommerceError;
use crate::service::concurrency::{update_with_retry, RetryPolicy};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const VAULT_CUSTOM_TYPE: &str = "powerboard-components-customer-vault-type";
pub const FIELD_USER_VAULT_TOKENS: &str = "userVaultTokens";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveOutcome {
    fn saved() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The customer's saved instruments, keyed by `"<type>-<fingerprint>"`.
/// An unreadable field is treated as empty.
pub fn stored_tokens(customer: &Customer) -> BTreeMap<String, StoredToken> {
    let Some(raw) = customer.field_str(FIELD_USER_VAULT_TOKENS) else {
        return BTreeMap::new();
    };
    let entries: Map<String, Value> = match serde_json::from_str(raw) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!(customer_id = %customer.id, error = %e, "unreadable vault token map");
            return BTreeMap::new();
        }
    };
    entries
        .into_iter()
        .filter_map(|(key, value)| serde_json::from_value(value).ok().map(|token| (key, token)))
        .collect()
}

/// Inserts the instrument, or refreshes the existing entry with the same
/// fingerprint in place.
pub fn merge_token(
    tokens: &mut BTreeMap<String, StoredToken>,
    token: &VaultTokenData,
    user_id: &str,
    customer_id: Option<&str>,
) {
    let key = token.storage_key();
    let customer_id = customer_id.map(ToString::to_string);
    match tokens.get_mut(&key) {
        Some(existing) => {
            existing.customer_id = customer_id;
            existing.vault_token = token.vault_token.clone();
            existing.data = token.clone();
            existing.title = token.title();
        }
        None => {
            tokens.insert(
                key,
                StoredToken {
                    user_id: user_id.to_string(),
                    token_type: token.token_type.clone(),
                    vault_token: token.vault_token.clone(),
                    customer_id,
                    data: token.clone(),
                    title: token.title(),
                },
            );
        }
    }
}

fn save_actions(customer: &Customer, tokens: &BTreeMap<String, StoredToken>) -> Vec<UpdateAction> {
    let text = serde_json::to_string(tokens).unwrap_or_else(|_| "{}".to_string());
    if customer.custom_type_key() == Some(VAULT_CUSTOM_TYPE) {
        return vec![UpdateAction::set_field(FIELD_USER_VAULT_TOKENS, text)];
    }
    let mut fields = Map::new();
    fields.insert(FIELD_USER_VAULT_TOKENS.to_string(), Value::String(text));
    vec![UpdateAction::SetCustomType {
        type_ref: TypeReference::by_key(VAULT_CUSTOM_TYPE),
        fields: Some(fields),
    }]
}

/// Saved tokens grouped by instrument type, then by vault token.
pub fn group_by_type(tokens: Vec<StoredToken>) -> BTreeMap<String, BTreeMap<String, StoredToken>> {
    let mut grouped: BTreeMap<String, BTreeMap<String, StoredToken>> = BTreeMap::new();
    for token in tokens {
        grouped
            .entry(token.token_type.clone())
            .or_default()
            .insert(token.vault_token.clone(), token);
    }
    grouped
}

#[derive(Clone)]
pub struct TokenStore {
    pub commerce: Arc<dyn CommercePlatform>,
    pub retry: RetryPolicy,
}

impl TokenStore {
    pub fn new(commerce: Arc<dyn CommercePlatform>, retry: RetryPolicy) -> Self {
        Self { commerce, retry }
    }

    /// Never fails the caller: platform errors come back as `success: false`.
    pub async fn save_token(&self, token: &VaultTokenData, user_id: &str, customer_id: Option<&str>) -> SaveOutcome {
        let customer = match self.commerce.get_customer(user_id).await {
            Ok(Some(customer)) => customer,
            Ok(None) => return SaveOutcome::failed(format!("customer {user_id} not found")),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "could not load customer for token save");
                return SaveOutcome::failed(e.to_string());
            }
        };

        let result = update_with_retry(self.commerce.as_ref(), self.retry, customer, |current| {
            let mut tokens = stored_tokens(current);
            merge_token(&mut tokens, token, user_id, customer_id);
            save_actions(current, &tokens)
        })
        .await;

        match result {
            Ok(_) => {
                tracing::info!(user_id, key = %token.storage_key(), "vault token saved");
                SaveOutcome::saved()
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "vault token save failed");
                SaveOutcome::failed(e.to_string())
            }
        }
    }

    pub async fn find_customer_id_by_token(
        &self,
        user_id: &str,
        vault_token: &str,
    ) -> Result<Option<String>, CommerceError> {
        let Some(customer) = self.commerce.get_customer(user_id).await? else {
            return Ok(None);
        };
        Ok(stored_tokens(&customer)
            .into_values()
            .find(|t| t.vault_token == vault_token)
            .and_then(|t| t.customer_id))
    }

    pub async fn list_tokens(&self, user_id: &str) -> Result<Vec<StoredToken>, CommerceError> {
        let Some(customer) = self.commerce.get_customer(user_id).await? else {
            return Ok(Vec::new());
        };
        Ok(stored_tokens(&customer).into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(vault_token: &str, last4: &str) -> VaultTokenData {
        serde_json::from_value(json!({
            "vault_token": vault_token,
            "type": "card",
            "card_number_bin": "411111",
            "card_number_last4": last4,
            "card_scheme": "visa",
            "expire_month": 9,
            "expire_year": 2030
        }))
        .unwrap()
    }

    #[test]
    fn merge_overwrites_same_fingerprint() {
        let mut tokens = BTreeMap::new();
        merge_token(&mut tokens, &token("vt_1", "1111"), "u1", None);
        merge_token(&mut tokens, &token("vt_2", "1111"), "u1", Some("cus_1"));
        assert_eq!(tokens.len(), 1);
        let entry = &tokens["card-4111111111"];
        assert_eq!(entry.vault_token, "vt_2");
        assert_eq!(entry.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(entry.title, "Visa 1111 09/2030");
    }

    #[test]
    fn first_save_sets_the_custom_type() {
        let customer = Customer {
            id: "u1".to_string(),
            version: 1,
            email: None,
            custom: None,
        };
        let actions = save_actions(&customer, &BTreeMap::new());
        assert!(matches!(
            &actions[0],
            UpdateAction::SetCustomType { type_ref, .. } if type_ref.key.as_deref() == Some(VAULT_CUSTOM_TYPE)
        ));
    }

    #[test]
    fn grouping_is_by_type_then_token() {
        let mut tokens = BTreeMap::new();
        merge_token(&mut tokens, &token("vt_1", "1111"), "u1", None);
        merge_token(&mut tokens, &token("vt_2", "2222"), "u1", None);
        let grouped = group_by_type(tokens.into_values().collect());
        assert_eq!(grouped["card"].len(), 2);
        assert!(grouped["card"].contains_key("vt_2"));
    }
}
