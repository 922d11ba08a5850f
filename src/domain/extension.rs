use crate::domain::payment::{decimal_from_value, Payment, FIELD_EXTENSION_REQUEST};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const USER_NOT_AUTHORIZED: &str = "not authorized";

/// Action discriminators carried in `PaymentExtensionRequest.action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionAction {
    GetPaymentMethods,
    GetVaultToken,
    MakePayment,
    GetStandalone3dsToken,
    UpdatePaymentStatus,
    MakePreCharge,
    /// Written by the webhook path so the storefront never re-enters the extension.
    FromNotification,
}

impl ExtensionAction {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "getPaymentMethodsRequest" => ExtensionAction::GetPaymentMethods,
            "getVaultTokenRequest" => ExtensionAction::GetVaultToken,
            "makePaymentRequest" => ExtensionAction::MakePayment,
            "getStandalone3dsTokenRequest" => ExtensionAction::GetStandalone3dsToken,
            "updatePaymentStatus" => ExtensionAction::UpdatePaymentStatus,
            "makePreChargeResponse" => ExtensionAction::MakePreCharge,
            "FromNotification" => ExtensionAction::FromNotification,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtensionAction::GetPaymentMethods => "getPaymentMethodsRequest",
            ExtensionAction::GetVaultToken => "getVaultTokenRequest",
            ExtensionAction::MakePayment => "makePaymentRequest",
            ExtensionAction::GetStandalone3dsToken => "getStandalone3dsTokenRequest",
            ExtensionAction::UpdatePaymentStatus => "updatePaymentStatus",
            ExtensionAction::MakePreCharge => "makePreChargeResponse",
            ExtensionAction::FromNotification => "FromNotification",
        }
    }
}

/// The inbound request envelope stored on the payment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub request: Value,
}

impl ExtensionRequest {
    pub fn from_notification() -> Self {
        Self {
            action: Some(ExtensionAction::FromNotification.as_str().to_string()),
            request: Value::Object(Default::default()),
        }
    }

    pub fn of(payment: &Payment) -> Option<Self> {
        let raw = payment.field_str(FIELD_EXTENSION_REQUEST)?;
        serde_json::from_str(raw).ok()
    }

    pub fn action(&self) -> Option<ExtensionAction> {
        self.action.as_deref().and_then(ExtensionAction::parse)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.request
            .get("CommerceToolsUserId")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
    }
}

/// Billing and address details collected at checkout. They may arrive at the
/// top level of the request or nested under `AdditionalInfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingDetails {
    #[serde(default)]
    pub billing_first_name: Option<String>,
    #[serde(default)]
    pub billing_last_name: Option<String>,
    #[serde(default)]
    pub billing_email: Option<String>,
    #[serde(default)]
    pub billing_phone: Option<String>,
    #[serde(default)]
    pub billing_address_1: Option<String>,
    #[serde(default)]
    pub billing_address_2: Option<String>,
    #[serde(default)]
    pub billing_city: Option<String>,
    #[serde(default)]
    pub billing_state: Option<String>,
    #[serde(default)]
    pub billing_postcode: Option<String>,
    #[serde(default)]
    pub billing_country: Option<String>,
    #[serde(default)]
    pub address_country: Option<String>,
    #[serde(default)]
    pub address_postcode: Option<String>,
    #[serde(default)]
    pub address_city: Option<String>,
    #[serde(default)]
    pub address_line: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub address_state: Option<String>,
}

macro_rules! merge_fields {
    ($target:ident, $source:ident, $($field:ident),+ $(,)?) => {
        $(if $source.$field.is_some() { $target.$field = $source.$field; })+
    };
}

impl BillingDetails {
    /// Values present in `other` win.
    pub fn merge(&mut self, other: BillingDetails) {
        merge_fields!(
            self,
            other,
            billing_first_name,
            billing_last_name,
            billing_email,
            billing_phone,
            billing_address_1,
            billing_address_2,
            billing_city,
            billing_state,
            billing_postcode,
            billing_country,
            address_country,
            address_postcode,
            address_city,
            address_line,
            address_line2,
            address_state,
        );
    }

    pub fn first_name(&self) -> String {
        self.billing_first_name.clone().unwrap_or_default()
    }

    pub fn last_name(&self) -> String {
        self.billing_last_name.clone().unwrap_or_default()
    }

    pub fn email(&self) -> String {
        self.billing_email.clone().unwrap_or_default()
    }

    pub fn phone(&self) -> String {
        self.billing_phone.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestAmount {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Body of a `makePaymentRequest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MakePaymentRequest {
    #[serde(rename = "orderId", default)]
    pub order_id: Option<String>,
    #[serde(rename = "PowerboardTransactionId", default)]
    pub transaction_token: Option<String>,
    #[serde(rename = "PowerboardPaymentType", default)]
    pub payment_type: Option<String>,
    #[serde(rename = "PowerboardPaymentStatus", default)]
    pub payment_status: Option<String>,
    #[serde(rename = "VaultToken", default)]
    pub vault_token: Option<String>,
    #[serde(rename = "CommerceToolsUserId", default)]
    pub user_id: Option<String>,
    #[serde(rename = "SaveCard", default)]
    pub save_card: bool,
    #[serde(rename = "AdditionalInfo", default)]
    pub additional_info: Option<Value>,
    #[serde(default)]
    pub amount: Option<RequestAmount>,
    #[serde(default)]
    pub charge_id: Option<String>,
    #[serde(rename = "charge3dsId", default)]
    pub charge_3ds_id: Option<String>,
    #[serde(default)]
    pub cvv: Option<String>,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(flatten)]
    pub billing: BillingDetails,
}

impl MakePaymentRequest {
    pub fn billing(&self) -> BillingDetails {
        let mut merged = self.billing.clone();
        if let Some(info) = &self.additional_info {
            if let Ok(nested) = serde_json::from_value::<BillingDetails>(info.clone()) {
                merged.merge(nested);
            }
        }
        merged
    }

    /// A signed-in shopper; guests are reported as `"not authorized"`.
    pub fn authenticated_user(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .filter(|u| !u.is_empty() && *u != USER_NOT_AUTHORIZED)
    }

    pub fn supplied_vault_token(&self) -> Option<&str> {
        self.vault_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn requested_amount(&self) -> Option<Decimal> {
        self.amount
            .as_ref()
            .and_then(|a| a.value.as_ref())
            .and_then(decimal_from_value)
    }

    pub fn currency(&self) -> String {
        self.amount
            .as_ref()
            .and_then(|a| a.currency.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "AUD".to_string())
    }
}

/// Body of a `getVaultTokenRequest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultTokenRequest {
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(rename = "saveCard", default)]
    pub save_card: bool,
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
}

/// Body of a `makePreChargeResponse`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreChargeRequest {
    #[serde(default)]
    pub data: Value,
    #[serde(default = "default_capture")]
    pub capture: bool,
}

fn default_capture() -> bool {
    true
}

/// Body of an `updatePaymentStatus` request issued from the merchant center.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(rename = "newStatus")]
    pub new_status: String,
    #[serde(rename = "oldStatus", default)]
    pub old_status: Option<String>,
    #[serde(rename = "capturedAmount", default)]
    pub captured_amount: Option<Value>,
    #[serde(rename = "refundAmount", default)]
    pub refund_amount: Option<Value>,
}

/// Outcome envelope written back to `PaymentExtensionResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Success,
    Failure,
    Error,
    UnfulfilledCondition,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "Success",
            OutcomeStatus::Failure => "Failure",
            OutcomeStatus::Error => "Error",
            OutcomeStatus::UnfulfilledCondition => "UnfulfilledCondition",
        }
    }
}
