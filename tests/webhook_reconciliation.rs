mod common;

use common::{harness, live_card_config, order, payment, with_field};
use powerboard_connector::commerce::CommercePlatform;
use powerboard_connector::domain::extension::{ExtensionAction, ExtensionRequest, OutcomeStatus};
use powerboard_connector::domain::notification::NotificationPayload;
use powerboard_connector::domain::payment::{
    Payment, FIELD_CAPTURED_AMOUNT, FIELD_PAYMENT_STATUS, FIELD_TRANSACTION_ID,
};
use powerboard_connector::repo::audit_log::LOG_CONTAINER;
use powerboard_connector::status::GatewayStatus;
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn pending_payment(id: &str) -> Payment {
    let p = with_field(payment(id, 10_000), FIELD_PAYMENT_STATUS, "powerboard-pending");
    with_field(p, FIELD_TRANSACTION_ID, "ch_1")
}

fn transaction_success(reference: &str, status: &str, captured: Value) -> NotificationPayload {
    serde_json::from_value(json!({
        "event": "transaction_success",
        "notification": {
            "_id": "ch_1",
            "reference": reference,
            "status": status,
            "type": "SALE",
            "amount": 100,
            "transaction": { "_id": "tx_1", "amount": captured, "status": status }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn full_capture_marks_payment_paid_and_completes_order() {
    let h = harness(live_card_config());
    h.commerce.insert_payment(pending_payment("pay-1"));
    h.commerce.insert_order(order("ord-1"), &["pay-1"]);

    let outcome = h
        .state
        .reconciler
        .process(&transaction_success("pay-1", "complete", json!(100)))
        .await;
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.gateway_status, Some(GatewayStatus::Paid));

    let stored = h.commerce.payment("pay-1").unwrap();
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-paid"));
    assert_eq!(stored.field_decimal(FIELD_CAPTURED_AMOUNT), Some(Decimal::from(100)));
    assert_eq!(
        ExtensionRequest::of(&stored).and_then(|r| r.action()),
        Some(ExtensionAction::FromNotification)
    );
    assert_eq!(stored.interface_interactions.len(), 1);
    assert_eq!(stored.interface_interactions[0]["fields"]["operation"], json!("Sale"));

    let order = h.commerce.order("ord-1").unwrap();
    assert_eq!(order.payment_state.as_deref(), Some("Paid"));
    assert_eq!(order.order_state.as_deref(), Some("Complete"));
}

#[tokio::test]
async fn partial_capture_keeps_order_open() {
    let h = harness(live_card_config());
    h.commerce.insert_payment(pending_payment("pay-1"));
    h.commerce.insert_order(order("ord-1"), &["pay-1"]);

    let outcome = h
        .state
        .reconciler
        .process(&transaction_success("pay-1", "complete", json!(60)))
        .await;
    assert_eq!(outcome.gateway_status, Some(GatewayStatus::PartialPaid));

    let stored = h.commerce.payment("pay-1").unwrap();
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-p-paid"));
    assert_eq!(stored.field_decimal(FIELD_CAPTURED_AMOUNT), Some(Decimal::from(60)));

    let order = h.commerce.order("ord-1").unwrap();
    assert_eq!(order.payment_state.as_deref(), Some("Paid"));
    assert_eq!(order.order_state.as_deref(), Some("Open"));
}

#[tokio::test]
async fn redelivered_notification_changes_nothing() {
    let h = harness(live_card_config());
    h.commerce.insert_payment(pending_payment("pay-1"));
    let payload = transaction_success("pay-1", "complete", json!(100));

    h.state.reconciler.process(&payload).await;
    let after_first = h.commerce.payment("pay-1").unwrap();

    let outcome = h.state.reconciler.process(&payload).await;
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.message, "Notification already applied");
    assert_eq!(outcome.gateway_status, None);
    assert_eq!(h.commerce.payment("pay-1").unwrap(), after_first);
    assert!(h.commerce.list_custom_objects(LOG_CONTAINER).await.unwrap().is_empty());
}

#[tokio::test]
async fn late_pending_notification_does_not_walk_back_a_paid_payment() {
    let h = harness(live_card_config());
    let paid = with_field(pending_payment("pay-1"), FIELD_PAYMENT_STATUS, "powerboard-paid");
    h.commerce.insert_payment(paid);

    let outcome = h
        .state
        .reconciler
        .process(&transaction_success("pay-1", "pending", json!(100)))
        .await;
    assert_eq!(outcome.message, "Notification already applied");
    let stored = h.commerce.payment("pay-1").unwrap();
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-paid"));
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn uncaptured_pending_charge_becomes_an_authorisation() {
    let h = harness(live_card_config());
    h.commerce.insert_payment(pending_payment("pay-1"));
    let mut payload = transaction_success("pay-1", "pending", json!(0));
    payload.notification.capture = Some(false);

    let outcome = h.state.reconciler.process(&payload).await;
    assert_eq!(outcome.gateway_status, Some(GatewayStatus::Authorize));
    let stored = h.commerce.payment("pay-1").unwrap();
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-authorize"));
    assert_eq!(stored.field(FIELD_CAPTURED_AMOUNT), None);
}

#[tokio::test]
async fn payment_is_found_by_order_reference_key() {
    let h = harness(live_card_config());
    let mut p = pending_payment("pay-1");
    p.key = Some("R-100".to_string());
    h.commerce.insert_payment(p);

    let outcome = h
        .state
        .reconciler
        .process(&transaction_success("R-100", "complete", json!(100)))
        .await;
    assert_eq!(outcome.gateway_status, Some(GatewayStatus::Paid));
}

#[tokio::test]
async fn unroutable_notifications_fail_without_writes() {
    let h = harness(live_card_config());
    h.commerce.insert_payment(pending_payment("pay-1"));

    let mut no_reference = transaction_success("pay-1", "complete", json!(100));
    no_reference.notification.reference = None;
    assert_eq!(h.state.reconciler.process(&no_reference).await.message, "Reference not found");

    let unknown_payment = transaction_success("pay-404", "complete", json!(100));
    assert_eq!(h.state.reconciler.process(&unknown_payment).await.message, "Payment not found");

    let mut unknown_event = transaction_success("pay-1", "complete", json!(100));
    unknown_event.event = Some("subscription_created".to_string());
    let outcome = h.state.reconciler.process(&unknown_event).await;
    assert_eq!(outcome.status, OutcomeStatus::Failure);
    assert_eq!(outcome.message, "Notification Event not found");

    assert_eq!(h.commerce.payment("pay-1").unwrap().version, 1);
}

#[tokio::test]
async fn failed_transaction_cancels_the_order() {
    let h = harness(live_card_config());
    h.commerce.insert_payment(pending_payment("pay-1"));
    h.commerce.insert_order(order("ord-1"), &["pay-1"]);

    let mut payload = transaction_success("pay-1", "failed", json!(0));
    payload.event = Some("transaction_failure".to_string());
    let outcome = h.state.reconciler.process(&payload).await;
    assert_eq!(outcome.gateway_status, Some(GatewayStatus::Failed));

    let order = h.commerce.order("ord-1").unwrap();
    assert_eq!(order.payment_state.as_deref(), Some("Failed"));
    assert_eq!(order.order_state.as_deref(), Some("Cancelled"));
}

#[tokio::test]
async fn second_partial_capture_updates_the_captured_total() {
    let h = harness(live_card_config());
    h.commerce.insert_payment(pending_payment("pay-1"));

    h.state
        .reconciler
        .process(&transaction_success("pay-1", "complete", json!(40)))
        .await;
    let outcome = h
        .state
        .reconciler
        .process(&transaction_success("pay-1", "complete", json!(70)))
        .await;
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.gateway_status, Some(GatewayStatus::PartialPaid));

    let stored = h.commerce.payment("pay-1").unwrap();
    assert_eq!(stored.field_str(FIELD_PAYMENT_STATUS), Some("powerboard-p-paid"));
    assert_eq!(stored.field_decimal(FIELD_CAPTURED_AMOUNT), Some(Decimal::from(70)));
    assert_eq!(stored.interface_interactions.len(), 2);
}
