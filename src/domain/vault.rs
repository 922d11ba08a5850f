use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Vault token details as returned by `GET /v1/vault-tokens/{token}/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultTokenData {
    pub vault_token: String,
    #[serde(rename = "type", default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number_bin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number_last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_scheme: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub expire_month: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub expire_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_routing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The gateway reports expiry as either a number or a string.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl VaultTokenData {
    pub fn is_card(&self) -> bool {
        self.token_type == "card"
    }

    /// BIN plus last four for cards, routing plus account number otherwise.
    pub fn fingerprint(&self) -> String {
        let (a, b) = if self.is_card() {
            (&self.card_number_bin, &self.card_number_last4)
        } else {
            (&self.account_routing, &self.account_number)
        };
        format!("{}{}", a.as_deref().unwrap_or_default(), b.as_deref().unwrap_or_default())
    }

    pub fn storage_key(&self) -> String {
        let kind = if self.token_type.is_empty() { "card" } else { &self.token_type };
        format!("{kind}-{}", self.fingerprint())
    }

    /// `"Visa 1111 09/2030"` for cards, empty for anything else.
    pub fn title(&self) -> String {
        if !self.is_card() {
            return String::new();
        }
        let scheme = self.card_scheme.as_deref().unwrap_or_default();
        let mut chars = scheme.chars();
        let scheme = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        let month = self.expire_month.as_deref().unwrap_or_default();
        let month = if month.len() == 1 { format!("0{month}") } else { month.to_string() };
        format!(
            "{scheme} {} {month}/{}",
            self.card_number_last4.as_deref().unwrap_or_default(),
            self.expire_year.as_deref().unwrap_or_default()
        )
    }
}

/// One saved payment instrument in a customer's `userVaultTokens` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub user_id: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub vault_token: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub data: VaultTokenData,
    #[serde(default)]
    pub title: String,
}
