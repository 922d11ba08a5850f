#![allow(dead_code)]

use powerboard_connector::commerce::memory::InMemoryCommerce;
use powerboard_connector::commerce::{CommercePlatform, CustomObject, Order};
use powerboard_connector::config::AppConfig;
use powerboard_connector::domain::payment::{CustomFields, Money, Payment, FIELD_EXTENSION_REQUEST};
use powerboard_connector::gateways::mock::MockGateway;
use powerboard_connector::gateways::GatewayClient;
use powerboard_connector::repo::merchant_config_repo::CONFIG_CONTAINER;
use powerboard_connector::AppState;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub struct Harness {
    pub commerce: Arc<InMemoryCommerce>,
    pub gateway: Arc<MockGateway>,
    pub state: AppState,
}

pub fn app_config() -> AppConfig {
    AppConfig::from_lookup(|name| match name {
        "CTP_PROJECT_KEY" => Some("test-project".to_string()),
        "CTP_CLIENT_ID" => Some("extension-client".to_string()),
        "CTP_CLIENT_SECRET" => Some("extension-secret".to_string()),
        _ => None,
    })
    .unwrap()
}

pub fn live_card_config() -> Value {
    json!({
        "credentials_type": "credentials",
        "card_use_on_checkout": "Yes",
        "card_gateway_id": "gw_card",
        "card_direct_charge": "Enable",
    })
}

fn config_object(key: &str, value: Value) -> CustomObject {
    CustomObject {
        container: CONFIG_CONTAINER.to_string(),
        key: key.to_string(),
        value,
        version: 1,
        created_at: None,
        last_modified_at: None,
    }
}

/// Connector wired over in-memory platform and gateway doubles, with `live`
/// as the active merchant profile.
pub fn harness(live: Value) -> Harness {
    let commerce = Arc::new(InMemoryCommerce::new());
    commerce.insert_custom_object(config_object("live", live));
    commerce.insert_custom_object(config_object("sandbox", json!({})));
    commerce.insert_custom_object(config_object("widget", json!({})));

    let gateway = Arc::new(MockGateway::new());
    let platform: Arc<dyn CommercePlatform> = commerce.clone();
    let client: Arc<dyn GatewayClient> = gateway.clone();
    let state = AppState::new(platform, client, &app_config()).unwrap();
    Harness {
        commerce,
        gateway,
        state,
    }
}

pub fn payment(id: &str, cent_amount: i64) -> Payment {
    Payment {
        id: id.to_string(),
        version: 1,
        key: None,
        amount_planned: Money {
            cent_amount,
            currency_code: "AUD".to_string(),
            money_type: "centPrecision".to_string(),
            fraction_digits: 2,
        },
        custom: Some(CustomFields {
            type_ref: None,
            fields: Map::new(),
        }),
        interface_interactions: Vec::new(),
    }
}

pub fn with_field(mut payment: Payment, name: &str, value: impl Into<Value>) -> Payment {
    if let Some(custom) = payment.custom.as_mut() {
        custom.fields.insert(name.to_string(), value.into());
    }
    payment
}

pub fn with_request(payment: Payment, action: &str, request: Value) -> Payment {
    let text = json!({ "action": action, "request": request }).to_string();
    with_field(payment, FIELD_EXTENSION_REQUEST, text)
}

pub fn order(id: &str) -> Order {
    Order {
        id: id.to_string(),
        version: 1,
        order_state: Some("Open".to_string()),
        payment_state: Some("Pending".to_string()),
    }
}

pub fn json_field(payment: &Payment, name: &str) -> Value {
    payment
        .field_str(name)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(Value::Null)
}
