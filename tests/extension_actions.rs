mod common;

use common::{harness, json_field, live_card_config, payment, with_request, Harness};
use powerboard_connector::commerce::CommercePlatform;
use powerboard_connector::domain::payment::{Payment, FIELD_EXTENSION_REQUEST, FIELD_EXTENSION_RESPONSE};
use powerboard_connector::gateways::{GatewayResponse, HttpMethod};
use serde_json::{json, Value};

async fn run(h: &Harness, payment: Payment) -> Payment {
    h.commerce.insert_payment(payment.clone());
    let response = h.state.dispatcher.dispatch(&payment).await.unwrap().unwrap();
    h.commerce
        .update_payment(&payment.id, payment.version, &response.actions)
        .await
        .unwrap()
}

#[tokio::test]
async fn wallet_pre_charge_returns_token_and_charge() {
    let h = harness(live_card_config());
    let body = json!({ "amount": "100.00", "currency": "AUD", "customer": { "email": "ada@example.com" } });
    let p = with_request(
        payment("pay-1", 10_000),
        "makePreChargeResponse",
        json!({ "data": body, "capture": false }),
    );

    let stored = run(&h, p).await;

    let calls = h.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, "/v1/charges/wallet?capture=false");
    assert_eq!(calls[0].body, Some(body));
    assert_eq!(
        json_field(&stored, FIELD_EXTENSION_RESPONSE),
        json!({ "status": "Success", "token": "wallet_token_1", "chargeId": "ch_mock_2" })
    );
    assert_eq!(stored.field(FIELD_EXTENSION_REQUEST), None);
}

#[tokio::test]
async fn pre_charge_captures_unless_told_otherwise() {
    let h = harness(live_card_config());
    let p = with_request(payment("pay-1", 10_000), "makePreChargeResponse", json!({ "data": {} }));

    run(&h, p).await;

    assert_eq!(h.gateway.calls()[0].path, "/v1/charges/wallet?capture=true");
}

#[tokio::test]
async fn standalone_3ds_token_is_read_from_the_charge() {
    let h = harness(live_card_config());
    let p = with_request(
        payment("pay-1", 10_000),
        "getStandalone3dsTokenRequest",
        json!({ "amount": "100.00", "currency": "AUD", "_3ds": { "service_id": "svc_3ds" } }),
    );

    let stored = run(&h, p).await;

    assert_eq!(h.gateway.calls()[0].path, "/v1/charges/standalone-3ds");
    assert_eq!(
        json_field(&stored, FIELD_EXTENSION_RESPONSE),
        json!({ "status": "Success", "token": "3ds_token_2" })
    );
}

#[tokio::test]
async fn rejected_3ds_request_reports_failure() {
    let h = harness(live_card_config());
    h.gateway.respond(
        HttpMethod::Post,
        "/v1/charges/standalone-3ds",
        GatewayResponse::rejected(400, "Service not configured"),
    );
    let p = with_request(payment("pay-1", 10_000), "getStandalone3dsTokenRequest", json!({}));

    let stored = run(&h, p).await;

    let response: Value = json_field(&stored, FIELD_EXTENSION_RESPONSE);
    assert_eq!(response["status"], json!("Failure"));
    assert_eq!(response["message"], json!("gateway error: Service not configured"));
    assert!(response.get("token").is_none());
}
