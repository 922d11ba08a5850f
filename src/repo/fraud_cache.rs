use crate::charge::request_builder::ThreeDsBlock;
use crate::commerce::{CommercePlatform, CustomObject};
use crate::error::CommerceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const FRAUD_CACHE_CONTAINER: &str = "powerboard-storage";
const KEY_PREFIX: &str = "powerboard_fraud_";

pub fn cache_key(reference: &str) -> String {
    format!("{KEY_PREFIX}{reference}")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedBilling {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// What a pending standalone fraud check needs to resume the charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudCacheEntry {
    pub method: String,
    #[serde(default = "default_capture")]
    pub capture: bool,
    #[serde(rename = "charge3dsId", default, skip_serializing_if = "Option::is_none")]
    pub charge_3ds_id: Option<String>,
    #[serde(rename = "_3ds", default, skip_serializing_if = "Option::is_none")]
    pub three_ds: Option<ThreeDsBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ccv: Option<String>,
    #[serde(rename = "billingAddress", default)]
    pub billing_address: CachedBilling,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_capture() -> bool {
    true
}

impl FraudCacheEntry {
    /// In-built 3DS data means the resumed charge must be followed by a
    /// fraud-attach call.
    pub fn needs_fraud_attach(&self) -> bool {
        self.three_ds.is_some()
    }
}

/// Entries without any timestamp never expire.
pub fn is_expired(entry_created: Option<DateTime<Utc>>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let Some(created) = entry_created else {
        return false;
    };
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now - created > ttl,
        Err(_) => false,
    }
}

fn created_at(object: &CustomObject, entry: Option<&FraudCacheEntry>) -> Option<DateTime<Utc>> {
    entry.and_then(|e| e.created_at).or(object.created_at)
}

#[derive(Clone)]
pub struct FraudCache {
    pub commerce: Arc<dyn CommercePlatform>,
    pub ttl: Duration,
}

impl FraudCache {
    pub fn new(commerce: Arc<dyn CommercePlatform>, ttl: Duration) -> Self {
        Self { commerce, ttl }
    }

    pub async fn store(&self, reference: &str, entry: &FraudCacheEntry) -> Result<(), CommerceError> {
        let mut entry = entry.clone();
        entry.created_at = Some(Utc::now());
        self.commerce
            .upsert_custom_object(FRAUD_CACHE_CONTAINER, &cache_key(reference), serde_json::to_value(&entry)?)
            .await?;
        Ok(())
    }

    /// Removes and returns the entry for `reference`. The entry is deleted
    /// before it is handed out, and only the caller whose delete actually
    /// removed it gets `Some`, so concurrent deliveries cannot both resume.
    pub async fn take(&self, reference: &str) -> Result<Option<FraudCacheEntry>, CommerceError> {
        let key = cache_key(reference);
        let Some(object) = self.commerce.get_custom_object(FRAUD_CACHE_CONTAINER, &key).await? else {
            return Ok(None);
        };
        if !self.commerce.delete_custom_object(FRAUD_CACHE_CONTAINER, &key).await? {
            tracing::info!(reference, "fraud cache entry already consumed");
            return Ok(None);
        }

        let entry: FraudCacheEntry = serde_json::from_value(object.value.clone())?;
        if is_expired(created_at(&object, Some(&entry)), self.ttl, Utc::now()) {
            tracing::warn!(reference, "fraud cache entry expired before the verdict arrived");
            return Ok(None);
        }
        Ok(Some(entry))
    }

    pub async fn discard(&self, reference: &str) -> Result<bool, CommerceError> {
        self.commerce
            .delete_custom_object(FRAUD_CACHE_CONTAINER, &cache_key(reference))
            .await
    }

    /// Deletes every entry older than the TTL; returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, CommerceError> {
        let objects = self.commerce.list_custom_objects(FRAUD_CACHE_CONTAINER).await?;
        let mut removed = 0;
        for object in objects.iter().filter(|o| o.key.starts_with(KEY_PREFIX)) {
            let entry: Option<FraudCacheEntry> = serde_json::from_value(object.value.clone()).ok();
            if !is_expired(created_at(object, entry.as_ref()), self.ttl, now) {
                continue;
            }
            if self
                .commerce
                .delete_custom_object(FRAUD_CACHE_CONTAINER, &object.key)
                .await?
            {
                tracing::info!(key = %object.key, "removed orphaned fraud cache entry");
                removed += 1;
            }
        }
        Ok(removed)
    }
}
