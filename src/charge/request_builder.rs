//! Gateway request bodies for every charge flow.

use crate::charge::strategy::ChargeStrategy;
use crate::domain::extension::BillingDetails;
use crate::domain::merchant_config::{ApmSettings, CardSaveMethod, CardSettings, ThreeDsFlow};
use crate::domain::notification::Notification;
use crate::repo::fraud_cache::{CachedBilling, FraudCacheEntry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied charge details, already resolved by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargeInput {
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub billing: BillingDetails,
    pub vault_token: Option<String>,
    pub customer_id: Option<String>,
    pub cvv: Option<String>,
    pub charge_3ds_id: Option<String>,
    pub apm_token: Option<String>,
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_token: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_ccv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_postcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_source: Option<PaymentSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeDsBlock {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FraudBlock {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_id: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub reference: String,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Value>,
    pub customer: ChargeCustomer,
    #[serde(rename = "_3ds", default, skip_serializing_if = "Option::is_none")]
    pub three_ds: Option<ThreeDsBlock>,
    #[serde(rename = "_3ds_charge_id", default, skip_serializing_if = "Option::is_none")]
    pub three_ds_charge_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud: Option<FraudBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraud_charge_id: Option<String>,
    pub capture: bool,
    pub authorization: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeEndpoint {
    Charge { capture: bool },
    StandaloneFraud { capture: bool },
    FraudAttach { charge_id: String },
}

impl ChargeEndpoint {
    pub fn path(&self) -> String {
        let with_capture = |base: &str, capture: bool| {
            if capture {
                base.to_string()
            } else {
                format!("{base}?capture=false")
            }
        };
        match self {
            ChargeEndpoint::Charge { capture } => with_capture("/v1/charges", *capture),
            ChargeEndpoint::StandaloneFraud { capture } => with_capture("/v1/charges/fraud", *capture),
            ChargeEndpoint::FraudAttach { charge_id } => format!("/v1/charges/{charge_id}/fraud/attach"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCharge {
    pub strategy: ChargeStrategy,
    pub endpoint: ChargeEndpoint,
    pub request: ChargeRequest,
    /// Data needed to resume the charge once the fraud verdict arrives.
    pub fraud_cache: Option<FraudCacheEntry>,
    pub direct_charge: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub payment_source: CustomerPaymentSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerPaymentSource {
    pub vault_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
}

fn address_source(billing: &BillingDetails) -> PaymentSource {
    let line1 = billing.address_line.clone().unwrap_or_default();
    PaymentSource {
        address_country: Some(billing.address_country.clone().unwrap_or_default()),
        address_postcode: Some(billing.address_postcode.clone().unwrap_or_default()),
        address_city: Some(billing.address_city.clone().unwrap_or_default()),
        address_line2: Some(billing.address_line2.clone().unwrap_or_else(|| line1.clone())),
        address_line1: Some(line1),
        address_state: billing.address_state.clone().filter(|s| !s.is_empty()),
        ..PaymentSource::default()
    }
}

fn address_map(billing: &BillingDetails) -> Map<String, Value> {
    match serde_json::to_value(address_source(billing)) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn customer(billing: &BillingDetails, payment_source: Option<PaymentSource>) -> ChargeCustomer {
    ChargeCustomer {
        first_name: billing.first_name(),
        last_name: billing.last_name(),
        email: billing.email(),
        phone: billing.phone(),
        payment_source,
    }
}

fn vault_source(card: &CardSettings, input: &ChargeInput) -> PaymentSource {
    let mut source = address_source(&input.billing);
    source.vault_token = input.vault_token.clone();
    source.gateway_id = card.gateway_id.clone();
    source.card_ccv = input.cvv.clone().filter(|c| !c.is_empty());
    source
}

fn three_ds_block(card: &CardSettings, input: &ChargeInput) -> ThreeDsBlock {
    ThreeDsBlock {
        id: input.charge_3ds_id.clone().unwrap_or_default(),
        service_id: card.three_ds_service_id.clone().unwrap_or_default(),
    }
}

fn fraud_with_amount(service_id: Option<&String>, input: &ChargeInput) -> FraudBlock {
    let mut data = address_map(&input.billing);
    data.insert("amount".to_string(), decimal_json(input.amount));
    FraudBlock {
        service_id: service_id.cloned().unwrap_or_default(),
        data,
    }
}

fn fraud_with_contact(service_id: Option<&String>, billing: &BillingDetails) -> FraudBlock {
    let mut data = address_map(billing);
    data.insert("first_name".to_string(), Value::String(billing.first_name()));
    data.insert("last_name".to_string(), Value::String(billing.last_name()));
    data.insert("email".to_string(), Value::String(billing.email()));
    data.insert("phone".to_string(), Value::String(billing.phone()));
    FraudBlock {
        service_id: service_id.cloned().unwrap_or_default(),
        data,
    }
}

fn fraud_with_shipping(service_id: Option<&String>, billing: &BillingDetails) -> FraudBlock {
    let text = |v: &Option<String>| Value::String(v.clone().unwrap_or_default());
    let address_1 = billing.billing_address_1.clone().unwrap_or_default();
    let shipping = serde_json::json!({
        "customerEmailAddress": billing.email(),
        "shippingFirstName": billing.first_name(),
        "shippingLastName": billing.last_name(),
        "shippingAddress1": address_1,
        "shippingAddress2": billing.billing_address_2.clone().unwrap_or_else(|| address_1.clone()),
        "shippingCity": text(&billing.billing_city),
        "shippingState": text(&billing.billing_state),
        "shippingPostcode": text(&billing.billing_postcode),
        "shippingCountry": text(&billing.billing_country),
        "shippingPhone": billing.phone(),
        "shippingEmail": billing.email(),
    });
    let mut data = Map::new();
    data.insert(
        "transaction".to_string(),
        serde_json::json!({ "billing": shipping }),
    );
    FraudBlock {
        service_id: service_id.cloned().unwrap_or_default(),
        data,
    }
}

fn decimal_json(amount: Decimal) -> Value {
    crate::domain::payment::decimal_to_value(amount)
}

fn cache_entry(strategy: ChargeStrategy, card: &CardSettings, input: &ChargeInput) -> FraudCacheEntry {
    let billing = &input.billing;
    let mut entry = FraudCacheEntry {
        method: strategy.name().to_string(),
        capture: card.direct_charge,
        charge_3ds_id: None,
        three_ds: None,
        gateway_id: card.gateway_id.clone(),
        ccv: input.cvv.clone().filter(|c| !c.is_empty()),
        billing_address: CachedBilling {
            first_name: billing.first_name(),
            last_name: billing.last_name(),
            email: billing.email(),
            phone: billing.phone(),
        },
        created_at: None,
    };
    match strategy {
        ChargeStrategy::Standalone3dsStandaloneFraud => {
            entry.charge_3ds_id = Some(input.charge_3ds_id.clone().unwrap_or_default());
        }
        ChargeStrategy::InBuilt3dsStandaloneFraud => {
            entry.three_ds = Some(three_ds_block(card, input));
        }
        _ => {}
    }
    entry
}

/// Builds the request for a card strategy. The standalone-fraud flows also
/// return the cache entry that resumes the charge after the fraud verdict.
pub fn build_card_charge(strategy: ChargeStrategy, card: &CardSettings, input: &ChargeInput) -> BuiltCharge {
    use ChargeStrategy as S;

    let direct = card.direct_charge;
    let mut request = ChargeRequest {
        amount: input.amount,
        reference: input.reference.clone(),
        currency: input.currency.clone(),
        customer: customer(&input.billing, Some(vault_source(card, input))),
        capture: direct,
        authorization: !direct,
        ..ChargeRequest::default()
    };
    let mut endpoint = ChargeEndpoint::Charge { capture: direct };
    let fraud_service = card.fraud_service_id.as_ref();

    match strategy {
        S::CustomerCharge => {
            let mut source = address_source(&input.billing);
            source.gateway_id = card.gateway_id.clone();
            request.customer_id = input.customer_id.clone();
            request.customer.payment_source = Some(source);
        }
        S::InBuilt3dsInBuiltFraud => {
            if card.three_ds_flow == ThreeDsFlow::WithOtt {
                if let Some(source) = request.customer.payment_source.as_mut() {
                    source.vault_token = None;
                    source.amount = Some(input.amount);
                }
            }
            request.three_ds = Some(three_ds_block(card, input));
            request.fraud = Some(fraud_with_amount(fraud_service, input));
        }
        S::Standalone3dsStandaloneFraud => {
            request.fraud = Some(fraud_with_contact(fraud_service, &input.billing));
            endpoint = ChargeEndpoint::StandaloneFraud { capture: direct };
        }
        S::InBuilt3dsStandaloneFraud | S::StandaloneFraud => {
            request.fraud = Some(fraud_with_amount(fraud_service, input));
            endpoint = ChargeEndpoint::StandaloneFraud { capture: direct };
        }
        S::Standalone3dsInBuiltFraud => {
            request.three_ds_charge_id = Some(input.charge_3ds_id.clone().unwrap_or_default());
            request.fraud = Some(fraud_with_amount(fraud_service, input));
        }
        S::InBuilt3ds => {
            if card.three_ds_flow == ThreeDsFlow::WithOtt {
                if let Some(source) = request.customer.payment_source.as_mut() {
                    source.vault_token = None;
                    source.amount = Some(input.amount);
                }
            }
            request.three_ds = Some(three_ds_block(card, input));
        }
        S::Standalone3ds => {
            request.three_ds_charge_id = Some(input.charge_3ds_id.clone().unwrap_or_default());
        }
        S::InBuiltFraud => {
            request.fraud = Some(fraud_with_shipping(fraud_service, &input.billing));
        }
        S::SaveVaultTokenThenCharge | S::VaultTokenCharge | S::AlternativePaymentMethod => {}
    }

    let fraud_cache = strategy
        .defers_to_fraud_check()
        .then(|| cache_entry(strategy, card, input));
    if fraud_cache.is_some() {
        strip_empty_address_line2(&mut request);
    }

    BuiltCharge {
        strategy,
        endpoint,
        request,
        fraud_cache,
        direct_charge: direct,
    }
}

/// Zippay and Afterpay v1 charges against the one-time token from the widget.
/// Afterpay v1 is always captured immediately.
pub fn build_apm_charge(apm: &ApmSettings, always_capture: bool, input: &ChargeInput) -> BuiltCharge {
    let direct = always_capture || apm.direct_charge;
    let fraud = match (&apm.fraud_service_id, apm.fraud) {
        (Some(service_id), true) => Some(fraud_with_contact(Some(service_id), &input.billing)),
        _ => None,
    };
    BuiltCharge {
        strategy: ChargeStrategy::AlternativePaymentMethod,
        endpoint: ChargeEndpoint::Charge { capture: direct },
        request: ChargeRequest {
            amount: input.amount,
            reference: input.reference.clone(),
            currency: input.currency.clone(),
            token: input.apm_token.clone(),
            items: input.items.clone(),
            customer: customer(&input.billing, None),
            fraud,
            capture: direct,
            authorization: !direct,
            ..ChargeRequest::default()
        },
        fraud_cache: None,
        direct_charge: direct,
    }
}

/// The charge issued once a standalone fraud check comes back `complete`.
pub fn build_fraud_resume_charge(notification: &Notification, entry: &FraudCacheEntry) -> ChargeRequest {
    let mut source: PaymentSource = notification
        .payment_source()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    if entry.gateway_id.is_some() {
        source.gateway_id = entry.gateway_id.clone();
    }
    if entry.ccv.is_some() {
        source.card_ccv = entry.ccv.clone();
    }

    let billing = &entry.billing_address;
    ChargeRequest {
        amount: notification.amount().unwrap_or(Decimal::ZERO),
        reference: notification.reference().unwrap_or_default().to_string(),
        currency: notification.currency.clone().unwrap_or_else(|| "AUD".to_string()),
        customer: ChargeCustomer {
            first_name: billing.first_name.clone(),
            last_name: billing.last_name.clone(),
            email: billing.email.clone(),
            phone: billing.phone.clone(),
            payment_source: Some(source),
        },
        three_ds: entry.three_ds.clone(),
        three_ds_charge_id: entry.charge_3ds_id.clone().filter(|id| !id.is_empty()),
        fraud_charge_id: notification.id.clone(),
        capture: entry.capture,
        authorization: !entry.capture,
        ..ChargeRequest::default()
    }
}

pub fn build_customer_request(card: &CardSettings, billing: &BillingDetails, vault_token: &str) -> CustomerRequest {
    let gateway_id = match card.card_method_save {
        CardSaveMethod::CustomerWithGatewayId => card.gateway_id.clone(),
        _ => None,
    };
    CustomerRequest {
        first_name: billing.first_name(),
        last_name: billing.last_name(),
        email: billing.email(),
        phone: billing.phone(),
        payment_source: CustomerPaymentSource {
            vault_token: vault_token.to_string(),
            gateway_id,
        },
    }
}

/// The fraud endpoint rejects an empty second address line.
pub fn strip_empty_address_line2(request: &mut ChargeRequest) {
    let empty = request
        .customer
        .payment_source
        .as_ref()
        .map(|s| s.address_line2.as_deref().unwrap_or_default().is_empty())
        .unwrap_or(true);
    if !empty {
        return;
    }
    if let Some(source) = request.customer.payment_source.as_mut() {
        source.address_line2 = None;
    }
    if let Some(fraud) = request.fraud.as_mut() {
        fraud.data.remove("address_line2");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::strategy::select_card_strategy;
    use crate::domain::merchant_config::{FraudMode, ThreeDsMode};
    use serde_json::json;

    fn input() -> ChargeInput {
        ChargeInput {
            reference: "R1".to_string(),
            amount: Decimal::new(10000, 2),
            currency: "AUD".to_string(),
            billing: BillingDetails {
                billing_first_name: Some("Ada".to_string()),
                billing_email: Some("ada@example.com".to_string()),
                address_line: Some("1 George St".to_string()),
                address_city: Some("Sydney".to_string()),
                ..BillingDetails::default()
            },
            vault_token: Some("vt_1".to_string()),
            cvv: Some("123".to_string()),
            charge_3ds_id: Some("3ds_1".to_string()),
            ..ChargeInput::default()
        }
    }

    fn card(three_ds: ThreeDsMode, fraud: FraudMode) -> CardSettings {
        CardSettings {
            use_on_checkout: true,
            gateway_id: Some("gw".to_string()),
            three_ds,
            three_ds_service_id: Some("svc3ds".to_string()),
            fraud,
            fraud_service_id: Some("svcfraud".to_string()),
            ..CardSettings::default()
        }
    }

    #[test]
    fn plain_charge_body() {
        let settings = card(ThreeDsMode::Disabled, FraudMode::Disabled);
        let built = build_card_charge(ChargeStrategy::VaultTokenCharge, &settings, &input());
        let body = serde_json::to_value(&built.request).unwrap();
        assert_eq!(built.endpoint.path(), "/v1/charges");
        assert_eq!(body["reference"], json!("R1"));
        assert_eq!(body["customer"]["payment_source"]["vault_token"], json!("vt_1"));
        assert_eq!(body["customer"]["payment_source"]["card_ccv"], json!("123"));
        assert_eq!(body["customer"]["payment_source"]["address_line2"], json!("1 George St"));
        assert_eq!(body["capture"], json!(true));
        assert_eq!(body["authorization"], json!(false));
        assert!(body.get("_3ds").is_none());
    }

    #[test]
    fn non_direct_charge_appends_capture_flag() {
        let settings = CardSettings {
            direct_charge: false,
            ..card(ThreeDsMode::Disabled, FraudMode::Disabled)
        };
        let built = build_card_charge(ChargeStrategy::VaultTokenCharge, &settings, &input());
        assert_eq!(built.endpoint.path(), "/v1/charges?capture=false");
        assert!(built.request.authorization);
    }

    #[test]
    fn in_built_3ds_with_ott_sends_amount() {
        let settings = CardSettings {
            three_ds_flow: ThreeDsFlow::WithOtt,
            ..card(ThreeDsMode::InBuilt, FraudMode::Disabled)
        };
        let built = build_card_charge(ChargeStrategy::InBuilt3ds, &settings, &input());
        let source = built.request.customer.payment_source.unwrap();
        assert_eq!(source.vault_token, None);
        assert_eq!(source.amount, Some(Decimal::new(10000, 2)));
        assert_eq!(
            built.request.three_ds,
            Some(ThreeDsBlock { id: "3ds_1".to_string(), service_id: "svc3ds".to_string() })
        );
    }

    #[test]
    fn standalone_fraud_caches_resume_data() {
        let settings = card(ThreeDsMode::InBuilt, FraudMode::Standalone);
        let strategy = select_card_strategy(&settings, false, false);
        let built = build_card_charge(strategy, &settings, &input());
        assert_eq!(built.endpoint.path(), "/v1/charges/fraud");
        let cache = built.fraud_cache.unwrap();
        assert_eq!(cache.method, "cardFraudStandalone3DsInBuildCharge");
        assert_eq!(cache.three_ds.unwrap().id, "3ds_1");
        assert_eq!(cache.ccv.as_deref(), Some("123"));
        assert_eq!(cache.billing_address.first_name, "Ada");
    }

    #[test]
    fn fraud_endpoint_drops_empty_second_line() {
        let mut data = input();
        data.billing.address_line = None;
        let settings = card(ThreeDsMode::Disabled, FraudMode::Standalone);
        let built = build_card_charge(ChargeStrategy::StandaloneFraud, &settings, &data);
        let body = serde_json::to_value(&built.request).unwrap();
        assert!(body["customer"]["payment_source"].get("address_line2").is_none());
        assert!(body["fraud"]["data"].get("address_line2").is_none());
        assert_eq!(body["fraud"]["data"]["amount"], json!(100));
    }

    #[test]
    fn in_built_fraud_uses_shipping_block() {
        let settings = card(ThreeDsMode::Disabled, FraudMode::InBuilt);
        let built = build_card_charge(ChargeStrategy::InBuiltFraud, &settings, &input());
        let fraud = built.request.fraud.unwrap();
        assert_eq!(fraud.service_id, "svcfraud");
        assert_eq!(
            fraud.data["transaction"]["billing"]["customerEmailAddress"],
            json!("ada@example.com")
        );
    }

    #[test]
    fn customer_charge_omits_vault_token() {
        let mut data = input();
        data.customer_id = Some("cus_1".to_string());
        let settings = card(ThreeDsMode::Disabled, FraudMode::Disabled);
        let built = build_card_charge(ChargeStrategy::CustomerCharge, &settings, &data);
        assert_eq!(built.request.customer_id.as_deref(), Some("cus_1"));
        let source = built.request.customer.payment_source.unwrap();
        assert_eq!(source.vault_token, None);
        assert_eq!(source.gateway_id.as_deref(), Some("gw"));
    }

    #[test]
    fn apm_charge_carries_token_and_fraud() {
        let apm = ApmSettings {
            use_on_checkout: true,
            fraud: true,
            fraud_service_id: Some("f1".to_string()),
            ..ApmSettings::default()
        };
        let mut data = input();
        data.apm_token = Some("ott_1".to_string());
        let built = build_apm_charge(&apm, false, &data);
        assert_eq!(built.request.token.as_deref(), Some("ott_1"));
        assert!(built.request.customer.payment_source.is_none());
        assert_eq!(built.endpoint.path(), "/v1/charges?capture=false");
        assert_eq!(built.request.fraud.unwrap().data["first_name"], json!("Ada"));

        let afterpay = build_apm_charge(&ApmSettings::default(), true, &data);
        assert!(afterpay.direct_charge);
    }

    #[test]
    fn resume_charge_merges_cache_and_notification() {
        let entry = FraudCacheEntry {
            method: "cardFraudStandaloneCharge".to_string(),
            capture: false,
            charge_3ds_id: None,
            three_ds: None,
            gateway_id: Some("gw".to_string()),
            ccv: Some("999".to_string()),
            billing_address: CachedBilling {
                first_name: "Ada".to_string(),
                ..CachedBilling::default()
            },
            created_at: None,
        };
        let notification: Notification = serde_json::from_value(json!({
            "_id": "fraud_1",
            "reference": "R1",
            "amount": 100,
            "currency": "AUD",
            "customer": {"payment_source": {"vault_token": "vt_9", "card_scheme": "visa"}}
        }))
        .unwrap();
        let request = build_fraud_resume_charge(&notification, &entry);
        assert_eq!(request.fraud_charge_id.as_deref(), Some("fraud_1"));
        assert!(request.authorization);
        let source = request.customer.payment_source.unwrap();
        assert_eq!(source.vault_token.as_deref(), Some("vt_9"));
        assert_eq!(source.card_ccv.as_deref(), Some("999"));
        assert_eq!(source.extra.get("card_scheme"), Some(&json!("visa")));
    }
}
