use crate::status::GatewayStatus;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

pub const FIELD_EXTENSION_REQUEST: &str = "PaymentExtensionRequest";
pub const FIELD_EXTENSION_RESPONSE: &str = "PaymentExtensionResponse";
pub const FIELD_PAYMENT_STATUS: &str = "PowerboardPaymentStatus";
pub const FIELD_TRANSACTION_ID: &str = "PowerboardTransactionId";
pub const FIELD_PAYMENT_TYPE: &str = "PowerboardPaymentType";
pub const FIELD_CAPTURED_AMOUNT: &str = "CapturedAmount";
pub const FIELD_REFUNDED_AMOUNT: &str = "RefundedAmount";
pub const FIELD_USER_ID: &str = "CommerceToolsUserId";
pub const FIELD_ADDITIONAL_INFORMATION: &str = "AdditionalInformation";
pub const FIELD_APPLIED_REFUNDS: &str = "PowerboardAppliedRefunds";

pub const PAYMENT_LOG_INTERACTION_TYPE: &str = "powerboard-payment-log-interaction";

const MAX_DECIMAL_SCALE: u32 = 28;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub cent_amount: i64,
    pub currency_code: String,
    #[serde(rename = "type", default = "default_money_type")]
    pub money_type: String,
    #[serde(default = "default_fraction_digits")]
    pub fraction_digits: u32,
}

fn default_money_type() -> String {
    "centPrecision".to_string()
}

fn default_fraction_digits() -> u32 {
    2
}

impl Money {
    pub fn is_cent_precision(&self) -> bool {
        self.money_type == "centPrecision"
    }

    /// `centAmount / 10^fractionDigits` for cent-precision money, the raw
    /// `centAmount` otherwise. Scales past what `Decimal` holds are rounded
    /// to its finest scale.
    pub fn decimal_amount(&self) -> Decimal {
        if !self.is_cent_precision() {
            return Decimal::from(self.cent_amount);
        }
        match Decimal::try_new(self.cent_amount, self.fraction_digits) {
            Ok(amount) => amount,
            Err(e) => {
                tracing::warn!(
                    cent_amount = self.cent_amount,
                    fraction_digits = self.fraction_digits,
                    error = %e,
                    "money scale out of range"
                );
                let excess = self.fraction_digits - MAX_DECIMAL_SCALE;
                10_i64
                    .checked_pow(excess)
                    .and_then(|divisor| Decimal::new(self.cent_amount, MAX_DECIMAL_SCALE).checked_div(Decimal::from(divisor)))
                    .unwrap_or(Decimal::ZERO)
            }
        }
    }

    /// Inverse of [`Money::decimal_amount`], rounded to the money's fraction digits.
    pub fn cent_amount_of(&self, amount: Decimal) -> Option<i64> {
        if !self.is_cent_precision() {
            return amount.round().to_i64();
        }
        let scale = Decimal::from(10_i64.checked_pow(self.fraction_digits)?);
        (amount * scale).round().to_i64()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeReference {
    #[serde(rename = "typeId", default = "type_id", skip_serializing_if = "String::is_empty")]
    pub type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

fn type_id() -> String {
    "type".to_string()
}

impl TypeReference {
    pub fn by_key(key: &str) -> Self {
        Self {
            type_id: type_id(),
            id: None,
            key: Some(key.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFields {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<TypeReference>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub amount_planned: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomFields>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interface_interactions: Vec<Value>,
}

impl Payment {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.custom
            .as_ref()
            .and_then(|c| c.fields.get(name))
            .filter(|v| !v.is_null())
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn field_decimal(&self, name: &str) -> Option<Decimal> {
        self.field(name).and_then(decimal_from_value)
    }

    pub fn gateway_status(&self) -> Option<GatewayStatus> {
        self.field_str(FIELD_PAYMENT_STATUS)
            .and_then(|s| s.parse().ok())
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.field_str(FIELD_TRANSACTION_ID).filter(|s| !s.is_empty())
    }

    /// Amount the customer has actually been charged: the recorded capture if
    /// there is one, the planned amount otherwise.
    pub fn captured_or_planned(&self) -> Decimal {
        self.field_decimal(FIELD_CAPTURED_AMOUNT)
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| self.amount_planned.decimal_amount())
    }

    /// Message carried by the previous outbound response envelope, if any.
    pub fn previous_response_message(&self) -> Option<String> {
        let raw = self.field_str(FIELD_EXTENSION_RESPONSE)?;
        let parsed: Value = serde_json::from_str(raw).ok()?;
        parsed
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    pub fn applied_refunds(&self) -> Vec<String> {
        self.field_str(FIELD_APPLIED_REFUNDS)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Accepts JSON numbers and numeric strings (`"100"`, `"60.50"`).
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let raw = n.to_string();
            Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub fn decimal_to_value(amount: Decimal) -> Value {
    let normalized = amount.normalize();
    if normalized.scale() == 0 {
        if let Some(whole) = normalized.to_i64() {
            return Value::from(whole);
        }
    }
    normalized
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentState {
    Paid,
    Pending,
    Failed,
    BalanceDue,
    CreditOwed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Open,
    Confirmed,
    Complete,
    Cancelled,
}

impl PaymentState {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Paid => "Paid",
            PaymentState::Pending => "Pending",
            PaymentState::Failed => "Failed",
            PaymentState::BalanceDue => "BalanceDue",
            PaymentState::CreditOwed => "CreditOwed",
        }
    }
}

impl OrderState {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderState::Open => "Open",
            OrderState::Confirmed => "Confirmed",
            OrderState::Complete => "Complete",
            OrderState::Cancelled => "Cancelled",
        }
    }
}

/// Platform update actions this connector emits. A `SetCustomField` with a
/// null value removes the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum UpdateAction {
    SetCustomField {
        name: String,
        #[serde(default)]
        value: Value,
    },
    SetCustomType {
        #[serde(rename = "type")]
        type_ref: TypeReference,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Map<String, Value>>,
    },
    SetKey {
        key: String,
    },
    AddInterfaceInteraction {
        #[serde(rename = "type")]
        type_ref: TypeReference,
        fields: Map<String, Value>,
    },
    ChangePaymentState {
        #[serde(rename = "paymentState")]
        payment_state: PaymentState,
    },
    ChangeOrderState {
        #[serde(rename = "orderState")]
        order_state: OrderState,
    },
}

impl UpdateAction {
    pub fn set_field(name: &str, value: impl Into<Value>) -> Self {
        UpdateAction::SetCustomField {
            name: name.to_string(),
            value: value.into(),
        }
    }

    /// Objects are stored as their JSON text, the way the storefront reads them.
    pub fn set_json_field<T: Serialize>(name: &str, value: &T) -> Self {
        let text = serde_json::to_string(value).unwrap_or_default();
        Self::set_field(name, Value::String(text))
    }

    pub fn clear_field(name: &str) -> Self {
        Self::set_field(name, Value::Null)
    }

    pub fn set_status(status: GatewayStatus) -> Self {
        Self::set_field(FIELD_PAYMENT_STATUS, status.persisted())
    }

    pub fn set_amount(name: &str, amount: Decimal) -> Self {
        Self::set_field(name, decimal_to_value(amount))
    }
}

/// `setKey` is only emitted when the key actually changes: the platform
/// rejects a no-op key update.
pub fn key_update_action(current: Option<&str>, new_key: Option<&str>) -> Option<UpdateAction> {
    let new_key = new_key.filter(|k| !k.is_empty())?;
    if current == Some(new_key) {
        return None;
    }
    Some(UpdateAction::SetKey {
        key: new_key.to_string(),
    })
}
