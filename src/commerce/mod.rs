use crate::domain::payment::{CustomFields, Payment, UpdateAction};
use crate::error::CommerceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod http;
pub mod memory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub version: i64,
    #[serde(default)]
    pub order_state: Option<String>,
    #[serde(default)]
    pub payment_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub version: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomFields>,
}

impl Customer {
    pub fn custom_type_key(&self) -> Option<&str> {
        self.custom
            .as_ref()
            .and_then(|c| c.type_ref.as_ref())
            .and_then(|t| t.key.as_deref())
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.custom
            .as_ref()
            .and_then(|c| c.fields.get(name))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomObject {
    pub container: String,
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_at: Option<DateTime<Utc>>,
}

/// The commerce platform's records this connector reads and writes. Updates
/// are optimistic: a stale `version` fails with
/// [`CommerceError::ConcurrentModification`].
#[async_trait::async_trait]
pub trait CommercePlatform: Send + Sync {
    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, CommerceError>;

    async fn get_payment_by_key(&self, key: &str) -> Result<Option<Payment>, CommerceError>;

    async fn update_payment(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Payment, CommerceError>;

    async fn get_order(&self, id: &str) -> Result<Option<Order>, CommerceError>;

    async fn find_order_by_payment(&self, payment_id: &str) -> Result<Option<Order>, CommerceError>;

    async fn update_order(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Order, CommerceError>;

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>, CommerceError>;

    async fn update_customer(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Customer, CommerceError>;

    async fn get_custom_object(&self, container: &str, key: &str) -> Result<Option<CustomObject>, CommerceError>;

    async fn list_custom_objects(&self, container: &str) -> Result<Vec<CustomObject>, CommerceError>;

    async fn upsert_custom_object(&self, container: &str, key: &str, value: Value) -> Result<CustomObject, CommerceError>;

    /// Returns whether the object existed. Only one of several concurrent
    /// deletes of the same object sees `true`.
    async fn delete_custom_object(&self, container: &str, key: &str) -> Result<bool, CommerceError>;
}

/// Looks a payment up by id, then by key (the merchant order reference).
pub async fn find_payment(commerce: &dyn CommercePlatform, reference: &str) -> Result<Option<Payment>, CommerceError> {
    if let Some(payment) = commerce.get_payment(reference).await? {
        return Ok(Some(payment));
    }
    commerce.get_payment_by_key(reference).await
}
