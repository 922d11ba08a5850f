mod common;

use common::{harness, json_field, live_card_config, order, payment, with_field, with_request, Harness};
use powerboard_connector::commerce::CommercePlatform;
use powerboard_connector::domain::notification::NotificationPayload;
use powerboard_connector::domain::payment::{
    Payment, FIELD_CAPTURED_AMOUNT, FIELD_EXTENSION_RESPONSE, FIELD_PAYMENT_STATUS, FIELD_REFUNDED_AMOUNT,
    FIELD_TRANSACTION_ID,
};
use powerboard_connector::gateways::{GatewayResponse, HttpMethod};
use powerboard_connector::service::reconciler::MERCHANT_REFUND_MESSAGE;
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn charged(status: &str) -> Payment {
    let p = with_field(payment("pay-1", 10_000), FIELD_PAYMENT_STATUS, status);
    with_field(p, FIELD_TRANSACTION_ID, "ch_1")
}

async fn change_status(h: &Harness, payment: Payment, request: Value) -> Payment {
    let payment = with_request(payment, "updatePaymentStatus", request);
    h.commerce.insert_payment(payment.clone());
    let response = h.state.dispatcher.dispatch(&payment).await.unwrap().unwrap();
    h.commerce
        .update_payment(&payment.id, payment.version, &response.actions)
        .await
        .unwrap()
}

#[tokio::test]
async fn capturing_an_authorisation() {
    let h = harness(live_card_config());
    h.commerce.insert_order(order("ord-1"), &["pay-1"]);

    let stored = change_status(
        &h,
        charged("powerboard-authorize"),
        json!({ "newStatus": "powerboard-paid", "oldStatus": "powerboard-authorize" }),
    )
    .await;

    let calls = h.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, HttpMethod::Post);
    assert_eq!(calls[0].path, "/v1/charges/ch_1/capture");
    assert_eq!(calls[0].body, Some(json!({ "amount": 100, "from_webhook": true })));

    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-paid"));
    assert_eq!(stored.field_decimal(FIELD_CAPTURED_AMOUNT), Some(Decimal::from(100)));
    assert_eq!(
        json_field(&stored, FIELD_EXTENSION_RESPONSE),
        json!({ "status": true, "message": "Change status from 'powerboard-authorize' to 'powerboard-paid'" })
    );
    let order = h.commerce.order("ord-1").unwrap();
    assert_eq!(order.payment_state.as_deref(), Some("Paid"));
    assert_eq!(order.order_state.as_deref(), Some("Complete"));
}

#[tokio::test]
async fn cancelling_an_authorisation_releases_the_capture() {
    let h = harness(live_card_config());

    let stored = change_status(
        &h,
        charged("powerboard-authorize"),
        json!({ "newStatus": "powerboard-cancelled" }),
    )
    .await;

    let calls = h.gateway.calls();
    assert_eq!(calls[0].method, HttpMethod::Delete);
    assert_eq!(calls[0].path, "/v1/charges/ch_1/capture");
    assert_eq!(calls[0].body, None);
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-cancelled"));
}

#[tokio::test]
async fn merchant_refund_and_its_webhook_echo_count_once() {
    let h = harness(live_card_config());
    let paid = with_field(charged("powerboard-paid"), FIELD_CAPTURED_AMOUNT, 100);

    let stored = change_status(
        &h,
        paid,
        json!({ "newStatus": "powerboard-p-refund", "refundAmount": 30 }),
    )
    .await;

    assert_eq!(h.gateway.calls_to("/v1/charges/ch_1/refunds").len(), 1);
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-p-refund"));
    assert_eq!(stored.field_decimal(FIELD_REFUNDED_AMOUNT), Some(Decimal::from(30)));
    assert_eq!(
        json_field(&stored, FIELD_EXTENSION_RESPONSE),
        json!({ "status": true, "message": MERCHANT_REFUND_MESSAGE })
    );

    let echo: NotificationPayload = serde_json::from_value(json!({
        "event": "refund_success",
        "notification": {
            "_id": "ch_1",
            "reference": "pay-1",
            "status": "refunded",
            "transaction": { "_id": "rf_1", "amount": 30 }
        }
    }))
    .unwrap();
    h.state.reconciler.process(&echo).await;

    let after = h.commerce.payment("pay-1").unwrap();
    assert_eq!(after.field_decimal(FIELD_REFUNDED_AMOUNT), Some(Decimal::from(30)));
    assert_eq!(after.field(FIELD_EXTENSION_RESPONSE), None);
}

#[tokio::test]
async fn refund_without_amount_is_refused() {
    let h = harness(live_card_config());

    let stored = change_status(&h, charged("powerboard-paid"), json!({ "newStatus": "powerboard-refunded" })).await;

    assert!(h.gateway.calls().is_empty());
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-paid"));
    assert_eq!(json_field(&stored, FIELD_EXTENSION_RESPONSE)["status"], json!(false));
}

#[tokio::test]
async fn unsupported_change_is_reported_without_a_gateway_call() {
    let h = harness(live_card_config());

    let stored = change_status(&h, charged("powerboard-refunded"), json!({ "newStatus": "powerboard-paid" })).await;

    assert!(h.gateway.calls().is_empty());
    assert_eq!(
        json_field(&stored, FIELD_EXTENSION_RESPONSE),
        json!({ "status": false, "message": "Unsupported status change from powerboard-refunded to powerboard-paid" })
    );
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-refunded"));
}

#[tokio::test]
async fn gateway_rejection_leaves_the_status_alone() {
    let h = harness(live_card_config());
    h.gateway.respond(
        HttpMethod::Post,
        "/v1/charges/ch_1/capture",
        GatewayResponse::rejected(400, "Charge already captured"),
    );

    let stored = change_status(&h, charged("powerboard-authorize"), json!({ "newStatus": "powerboard-paid" })).await;

    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-authorize"));
    assert_eq!(
        json_field(&stored, FIELD_EXTENSION_RESPONSE),
        json!({ "status": false, "message": "gateway error: Charge already captured" })
    );
    assert_eq!(stored.interface_interactions.len(), 1);
    assert_eq!(stored.interface_interactions[0]["fields"]["status"], json!("Failure"));
}
