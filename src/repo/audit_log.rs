use crate::commerce::CommercePlatform;
use crate::domain::extension::OutcomeStatus;
use crate::domain::payment::{TypeReference, UpdateAction, PAYMENT_LOG_INTERACTION_TYPE};
use crate::error::CommerceError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const LOG_CONTAINER: &str = "powerboard-logs";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    #[serde(rename = "powerboardChargeID")]
    pub charge_id: String,
    pub operation: String,
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    fn interaction_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("chargeId".to_string(), Value::from(self.charge_id.clone()));
        fields.insert("operation".to_string(), Value::from(self.operation.clone()));
        fields.insert("status".to_string(), Value::from(self.status.as_str()));
        fields.insert("message".to_string(), Value::from(self.message.clone()));
        fields.insert("createdAt".to_string(), Value::from(self.created_at.to_rfc3339()));
        fields
    }
}

/// Audit entries collected while one request is handled. The owner decides
/// where they end up: on the payment write that carries the state change, or
/// in the log container when no payment write happens.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        charge_id: impl Into<String>,
        operation: impl Into<String>,
        status: OutcomeStatus,
        message: impl Into<String>,
    ) {
        let entry = AuditEntry {
            charge_id: charge_id.into(),
            operation: operation.into(),
            status,
            message: message.into(),
            created_at: Utc::now(),
        };
        tracing::info!(
            charge_id = %entry.charge_id,
            operation = %entry.operation,
            status = entry.status.as_str(),
            message = %entry.message,
            "audit"
        );
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// `addInterfaceInteraction` actions for every entry, leaving the log
    /// intact so a retried write can rebuild them.
    pub fn to_actions(&self) -> Vec<UpdateAction> {
        self.entries
            .iter()
            .map(|entry| UpdateAction::AddInterfaceInteraction {
                type_ref: TypeReference::by_key(PAYMENT_LOG_INTERACTION_TYPE),
                fields: entry.interaction_fields(),
            })
            .collect()
    }

    pub fn take(&mut self) -> Vec<AuditEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// Writes entries into the `powerboard-logs` custom-object container read by
/// the merchant back-office.
#[derive(Clone)]
pub struct LogContainerWriter {
    pub commerce: Arc<dyn CommercePlatform>,
}

impl LogContainerWriter {
    pub fn new(commerce: Arc<dyn CommercePlatform>) -> Self {
        Self { commerce }
    }

    pub async fn write(&self, entry: &AuditEntry) -> Result<(), CommerceError> {
        let key = format!(
            "powerboard-log_{}_{}",
            entry.created_at.timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        self.commerce
            .upsert_custom_object(LOG_CONTAINER, &key, serde_json::to_value(entry)?)
            .await?;
        Ok(())
    }

    /// Drains the log into the container; failures are logged and dropped.
    pub async fn flush(&self, log: &mut AuditLog) {
        for entry in log.take() {
            if let Err(e) = self.write(&entry).await {
                tracing::warn!(operation = %entry.operation, error = %e, "audit entry not persisted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_become_interface_interactions() {
        let mut log = AuditLog::new();
        log.record("ch_1", "Charge", OutcomeStatus::Success, "paid");
        let actions = log.to_actions();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            UpdateAction::AddInterfaceInteraction { type_ref, fields } => {
                assert_eq!(type_ref.key.as_deref(), Some(PAYMENT_LOG_INTERACTION_TYPE));
                assert_eq!(fields["chargeId"], Value::from("ch_1"));
                assert_eq!(fields["status"], Value::from("Success"));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(!log.is_empty());
    }

    #[test]
    fn take_empties_the_log() {
        let mut log = AuditLog::new();
        log.record("ch_1", "Refund", OutcomeStatus::Failure, "declined");
        assert_eq!(log.take().len(), 1);
        assert!(log.is_empty());
    }
}
