use crate::domain::payment::decimal_from_value;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    /// Charge outcome and in-charge fraud decisions.
    Direct,
    /// Verdict of a fraud check that ran before any charge existed.
    StandaloneFraud,
    RefundSuccess,
}

pub fn classify_event(event: &str) -> Option<EventFamily> {
    match event {
        "transaction_success"
        | "transaction_failure"
        | "fraud_check_in_review"
        | "fraud_check_in_review_async_approved"
        | "fraud_check_transaction_in_review_async_approved"
        | "fraud_check_success"
        | "fraud_check_transaction_in_review_approved"
        | "fraud_check_failed"
        | "fraud_check_transaction_in_review_declined" => Some(EventFamily::Direct),
        "standalone_fraud_check_success"
        | "standalone_fraud_check_failed"
        | "standalone_fraud_check_in_review_approved"
        | "standalone_fraud_check_in_review_declined"
        | "standalone_fraud_check_in_review_async_approved"
        | "standalone_fraud_check_in_review_async_declined" => Some(EventFamily::StandaloneFraud),
        "refund_success" => Some(EventFamily::RefundSuccess),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default)]
    pub notification: Notification,
    #[serde(default)]
    pub event: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub capture: Option<bool>,
    #[serde(default)]
    pub authorization: Option<bool>,
    #[serde(default)]
    pub from_webhook: Option<bool>,
    #[serde(default)]
    pub customer: Option<Value>,
    #[serde(default)]
    pub transaction: Option<NotificationTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationTransaction {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl Notification {
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref().filter(|r| !r.is_empty())
    }

    pub fn status(&self) -> &str {
        self.status.as_deref().unwrap_or_default()
    }

    /// Missing `capture` means the charge was captured.
    pub fn captured(&self) -> bool {
        self.capture.unwrap_or(true)
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.amount.as_ref().and_then(decimal_from_value)
    }

    pub fn transaction_amount(&self) -> Decimal {
        self.transaction
            .as_ref()
            .and_then(|t| t.amount.as_ref())
            .and_then(decimal_from_value)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn payment_source(&self) -> Option<&Value> {
        self.customer.as_ref().and_then(|c| c.get("payment_source"))
    }

    pub fn operation_label(&self) -> String {
        operation_label(self.kind.as_deref())
    }
}

/// `"Sale"`-style label derived from a gateway resource type.
pub fn operation_label(kind: Option<&str>) -> String {
    let raw = kind.unwrap_or("undefined").to_lowercase();
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
