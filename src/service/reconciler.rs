//! Applies gateway webhooks to payments.
//!
//! Every state change is one versioned payment write that also carries the
//! audit entries for it and the `FromNotification` request sentinel. Writes
//! are retried on version conflicts and recompute their actions from the
//! re-read payment, so a redelivered or late notification is judged against
//! what is actually stored.

use crate::charge::request_builder::{build_fraud_resume_charge, ChargeEndpoint};
use crate::commerce::{find_payment, CommercePlatform};
use crate::domain::extension::{ExtensionRequest, OutcomeStatus};
use crate::domain::notification::{classify_event, operation_label, EventFamily, Notification, NotificationPayload};
use crate::domain::payment::{
    OrderState, Payment, PaymentState, UpdateAction, FIELD_APPLIED_REFUNDS, FIELD_CAPTURED_AMOUNT,
    FIELD_EXTENSION_REQUEST, FIELD_EXTENSION_RESPONSE, FIELD_REFUNDED_AMOUNT, FIELD_TRANSACTION_ID,
};
use crate::error::ConnectorError;
use crate::gateways::api::PowerboardApi;
use crate::gateways::{GatewayClient, GatewayResponse};
use crate::repo::audit_log::{AuditLog, LogContainerWriter};
use crate::repo::fraud_cache::FraudCache;
use crate::service::concurrency::{update_with_retry, RetryPolicy};
use crate::service::config_cache::ConfigCache;
use crate::service::order_sync::OrderStateSync;
use crate::status::mapper::{accumulate_refund, fraud_completion_status, map_gateway_status, refine_capture, webhook_states_for_tag};
use crate::status::transitions::is_forward;
use crate::status::GatewayStatus;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Message the refund path of `updatePaymentStatus` leaves in the response
/// envelope; the matching `refund_success` webhook is then only acknowledged.
pub const MERCHANT_REFUND_MESSAGE: &str = "Merchant refunded money";
pub const FRAUD_DATA_NOT_FOUND: &str = "Fraud data not found in local storage";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(rename = "powerboardStatus", skip_serializing_if = "Option::is_none")]
    pub gateway_status: Option<GatewayStatus>,
}

impl NotificationOutcome {
    fn success(message: impl Into<String>, gateway_status: Option<GatewayStatus>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: message.into(),
            gateway_status,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            message: message.into(),
            gateway_status: None,
        }
    }

    fn unfulfilled(message: String) -> Self {
        Self {
            status: OutcomeStatus::UnfulfilledCondition,
            message,
            gateway_status: None,
        }
    }
}

fn from_notification_action() -> UpdateAction {
    UpdateAction::set_json_field(FIELD_EXTENSION_REQUEST, &ExtensionRequest::from_notification())
}

/// `"Can't charge.Card declined"` style reason built from the gateway's
/// structured error details.
fn unfulfilled_reason(prefix: &str, response: &GatewayResponse) -> String {
    let detail = response.describe_error();
    let detail = if detail.is_empty() { response.error_message() } else { detail };
    format!("{prefix}{detail}")
}

#[derive(Clone)]
pub struct WebhookReconciler {
    pub commerce: Arc<dyn CommercePlatform>,
    pub gateway: Arc<dyn GatewayClient>,
    pub config: ConfigCache,
    pub fraud_cache: FraudCache,
    pub orders: OrderStateSync,
    pub log_writer: LogContainerWriter,
    pub retry: RetryPolicy,
}

impl WebhookReconciler {
    pub async fn process(&self, payload: &NotificationPayload) -> NotificationOutcome {
        let notification = &payload.notification;
        let event = payload.event.as_deref().unwrap_or_default();

        let Some(reference) = notification.reference() else {
            tracing::warn!(event, "notification without reference");
            return NotificationOutcome::failure("Reference not found");
        };
        let payment = match find_payment(self.commerce.as_ref(), reference).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                tracing::warn!(reference, event, "notification for unknown payment");
                return NotificationOutcome::failure("Payment not found");
            }
            Err(e) => {
                tracing::error!(reference, event, error = %e, "payment lookup failed");
                return NotificationOutcome::failure(e.to_string());
            }
        };
        let Some(family) = classify_event(event) else {
            tracing::warn!(reference, event, "unrecognised notification event");
            return NotificationOutcome::failure("Notification Event not found");
        };

        tracing::info!(reference, event, payment_id = %payment.id, "processing notification");
        let mut audit = AuditLog::new();
        let outcome = match family {
            EventFamily::Direct => self.apply_direct(payment, notification, &mut audit).await,
            EventFamily::StandaloneFraud => self.apply_standalone_fraud(payment, notification, &mut audit).await,
            EventFamily::RefundSuccess => self.apply_refund(payment, notification, &mut audit).await,
        };

        // whatever did not ride along with a payment write goes to the log container
        self.log_writer.flush(&mut audit).await;
        outcome
    }

    /// Writes `build`'s actions plus the pending audit entries. `build`
    /// returning nothing leaves the payment untouched.
    async fn write<F>(
        &self,
        payment: Payment,
        audit: &mut AuditLog,
        mut build: F,
    ) -> Result<Option<Payment>, ConnectorError>
    where
        F: FnMut(&Payment) -> Vec<UpdateAction> + Send,
    {
        let audit_actions = audit.to_actions();
        let mut wrote = false;
        let updated = update_with_retry(self.commerce.as_ref(), self.retry, payment, |current| {
            let mut actions = build(current);
            wrote = !actions.is_empty();
            if wrote {
                actions.push(from_notification_action());
                actions.extend(audit_actions.iter().cloned());
            }
            actions
        })
        .await?;
        if !wrote {
            return Ok(None);
        }
        audit.take();
        Ok(Some(updated))
    }

    async fn apply_direct(&self, payment: Payment, notification: &Notification, audit: &mut AuditLog) -> NotificationOutcome {
        let triple = map_gateway_status(notification.status(), notification.captured());
        let captured = notification.transaction_amount();
        let tag = if triple.tag == GatewayStatus::Paid {
            refine_capture(triple.tag, captured, payment.amount_planned.decimal_amount())
        } else {
            triple.tag
        };
        let charge_id = notification.id.clone().unwrap_or_else(|| "0".to_string());
        let operation = notification.operation_label();
        let payment_id = payment.id.clone();

        audit.record(&charge_id, &operation, OutcomeStatus::Success, "");
        let result = self
            .write(payment, audit, |current| {
                if !is_forward(current.gateway_status(), tag) {
                    return Vec::new();
                }
                let mut actions = vec![UpdateAction::set_status(tag)];
                if matches!(tag, GatewayStatus::Paid | GatewayStatus::PartialPaid) {
                    actions.push(UpdateAction::set_amount(FIELD_CAPTURED_AMOUNT, captured));
                }
                actions
            })
            .await;

        match result {
            Ok(Some(_)) => {
                let (payment_state, order_state) = webhook_states_for_tag(tag);
                self.orders.push_logged(&payment_id, payment_state, order_state).await;
                tracing::info!(payment_id = %payment_id, status = %tag, "payment status updated from webhook");
                NotificationOutcome::success("", Some(tag))
            }
            Ok(None) => self.skipped(&payment_id, tag, audit),
            Err(e) => self.write_failed(&payment_id, &charge_id, &operation, e, audit),
        }
    }

    async fn apply_standalone_fraud(
        &self,
        payment: Payment,
        notification: &Notification,
        audit: &mut AuditLog,
    ) -> NotificationOutcome {
        let reference = notification.reference().unwrap_or_default().to_string();
        let operation = notification.operation_label();
        let fraud_charge_id = notification.id.clone().unwrap_or_default();

        if !notification.status().eq_ignore_ascii_case("complete") {
            if let Err(e) = self.fraud_cache.discard(&reference).await {
                tracing::warn!(reference = %reference, error = %e, "fraud cache entry not removed");
            }
            let payment_id = payment.id.clone();
            audit.record(&fraud_charge_id, &operation, OutcomeStatus::Failure, &operation);
            let result = self
                .write(payment, audit, |current| {
                    if !is_forward(current.gateway_status(), GatewayStatus::Failed) {
                        return Vec::new();
                    }
                    vec![UpdateAction::set_status(GatewayStatus::Failed)]
                })
                .await;
            return match result {
                Ok(Some(_)) => {
                    self.orders
                        .push_logged(&payment_id, PaymentState::Failed, OrderState::Cancelled)
                        .await;
                    NotificationOutcome::success(operation, Some(GatewayStatus::Failed))
                }
                Ok(None) => self.skipped(&payment_id, GatewayStatus::Failed, audit),
                Err(e) => self.write_failed(&payment_id, &fraud_charge_id, &operation, e, audit),
            };
        }

        let entry = match self.fraud_cache.take(&reference).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::info!(reference = %reference, "no pending fraud charge, nothing to resume");
                return NotificationOutcome::failure(FRAUD_DATA_NOT_FOUND);
            }
            Err(e) => {
                tracing::error!(reference = %reference, error = %e, "fraud cache read failed");
                return NotificationOutcome::failure(e.to_string());
            }
        };

        let config = match self.config.merchant_config().await {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(reference = %reference, error = %e, "merchant configuration unavailable");
                let message = format!("Can't charge.{e}");
                audit.record("0", "Charge", OutcomeStatus::UnfulfilledCondition, &message);
                return NotificationOutcome::unfulfilled(message);
            }
        };
        let api = PowerboardApi::new(self.gateway.as_ref(), config.connection());
        let request = build_fraud_resume_charge(notification, &entry);
        let response = api
            .charge(&ChargeEndpoint::Charge { capture: entry.capture }, &request)
            .await;
        let charge_id = response.charge_id().unwrap_or("0").to_string();
        if !response.is_success() {
            let message = unfulfilled_reason("Can't charge.", &response);
            tracing::warn!(reference = %reference, error = %message, "resumed charge rejected");
            audit.record(&charge_id, "Charge", OutcomeStatus::UnfulfilledCondition, &message);
            return NotificationOutcome::unfulfilled(message);
        }

        if entry.needs_fraud_attach() {
            let attach = api.fraud_attach(&charge_id, &fraud_charge_id).await;
            if !attach.is_success() {
                let message = unfulfilled_reason("Can't fraud attach.", &attach);
                tracing::warn!(reference = %reference, charge_id = %charge_id, error = %message, "fraud attach rejected");
                audit.record(&charge_id, "Fraud Attach", OutcomeStatus::UnfulfilledCondition, &message);
                return NotificationOutcome::unfulfilled(message);
            }
        }

        let authorization = response
            .data()
            .and_then(|d| d.get("authorization"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let (tag, payment_state) = fraud_completion_status(authorization, response.data_str("/status").unwrap_or_default());
        let charge_operation = operation_label(response.data_str("/type"));
        let payment_id = payment.id.clone();
        audit.record(&charge_id, &charge_operation, OutcomeStatus::Success, "");

        let result = self
            .write(payment, audit, |_| {
                vec![
                    UpdateAction::set_status(tag),
                    UpdateAction::set_field(FIELD_TRANSACTION_ID, charge_id.as_str()),
                ]
            })
            .await;
        match result {
            Ok(_) => {
                self.orders.push_logged(&payment_id, payment_state, OrderState::Open).await;
                tracing::info!(payment_id = %payment_id, charge_id = %charge_id, status = %tag, "charge resumed after fraud check");
                NotificationOutcome::success("", Some(tag))
            }
            Err(e) => self.write_failed(&payment_id, &charge_id, &charge_operation, e, audit),
        }
    }

    async fn apply_refund(&self, payment: Payment, notification: &Notification, audit: &mut AuditLog) -> NotificationOutcome {
        let Some(transaction) = notification.transaction.as_ref() else {
            return NotificationOutcome::failure("Refund notification without transaction");
        };
        if notification.from_webhook.unwrap_or(false) {
            tracing::debug!(payment_id = %payment.id, "refund issued by this connector, ignoring echo");
            return NotificationOutcome::failure("Refund already recorded");
        }
        let payment_id = payment.id.clone();
        let charge_id = notification.id.clone().unwrap_or_else(|| "0".to_string());

        if payment.previous_response_message().as_deref() == Some(MERCHANT_REFUND_MESSAGE) {
            let result = update_with_retry(self.commerce.as_ref(), self.retry, payment, |_| {
                vec![UpdateAction::clear_field(FIELD_EXTENSION_RESPONSE), from_notification_action()]
            })
            .await;
            return match result {
                Ok(_) => NotificationOutcome::success("", None),
                Err(e) => self.write_failed(&payment_id, &charge_id, "Refund", e, audit),
            };
        }

        let status = notification.status();
        if !(status.eq_ignore_ascii_case("refunded") || status.eq_ignore_ascii_case("refund_requested")) {
            tracing::warn!(payment_id = %payment_id, status, "refund notification with unexpected status");
            return NotificationOutcome::failure(format!("Unsupported refund status {status}"));
        }
        let refund = notification.transaction_amount();
        if refund <= Decimal::ZERO {
            return NotificationOutcome::failure("Refund amount missing");
        }
        let refund_id = transaction.id.clone().unwrap_or_else(|| charge_id.clone());

        let mut applied: Option<(GatewayStatus, Decimal)> = None;
        let result = update_with_retry(self.commerce.as_ref(), self.retry, payment, |current| {
            applied = None;
            let mut seen = current.applied_refunds();
            if seen.contains(&refund_id) {
                return Vec::new();
            }
            let previous = current.field_decimal(FIELD_REFUNDED_AMOUNT).unwrap_or(Decimal::ZERO);
            let outcome = accumulate_refund(previous, refund, current.captured_or_planned());
            if !is_forward(current.gateway_status(), outcome.status) {
                return Vec::new();
            }
            seen.push(refund_id.clone());
            applied = Some((outcome.status, outcome.refunded_total));

            let mut log = AuditLog::new();
            log.record(
                &charge_id,
                outcome.status.persisted(),
                OutcomeStatus::Success,
                format!("Refunded {}", outcome.refunded_total.normalize()),
            );
            let mut actions = vec![
                UpdateAction::set_status(outcome.status),
                UpdateAction::set_amount(FIELD_REFUNDED_AMOUNT, outcome.refunded_total),
                UpdateAction::set_field(FIELD_TRANSACTION_ID, charge_id.as_str()),
                UpdateAction::set_json_field(FIELD_APPLIED_REFUNDS, &seen),
                from_notification_action(),
            ];
            actions.extend(log.to_actions());
            actions
        })
        .await;

        match (result, applied) {
            (Ok(_), Some((tag, total))) => {
                self.orders
                    .push_logged(&payment_id, PaymentState::Paid, OrderState::Complete)
                    .await;
                tracing::info!(payment_id = %payment_id, status = %tag, refunded = %total, "refund applied");
                NotificationOutcome::success(format!("Refunded {}", total.normalize()), Some(tag))
            }
            (Ok(_), None) => {
                tracing::info!(payment_id = %payment_id, refund_id = %refund_id, "refund already applied");
                NotificationOutcome::success("Refund already applied", None)
            }
            (Err(e), _) => self.write_failed(&payment_id, &charge_id, "Refund", e, audit),
        }
    }

    /// The stored status is already at or past `tag`; redeliveries and late
    /// notifications end here.
    fn skipped(&self, payment_id: &str, tag: GatewayStatus, audit: &mut AuditLog) -> NotificationOutcome {
        tracing::info!(payment_id, status = %tag, "stale notification, payment status unchanged");
        audit.take();
        NotificationOutcome::success("Notification already applied", None)
    }

    fn write_failed(
        &self,
        payment_id: &str,
        charge_id: &str,
        operation: &str,
        error: ConnectorError,
        audit: &mut AuditLog,
    ) -> NotificationOutcome {
        tracing::error!(payment_id, error = %error, "payment update from notification failed");
        audit.take();
        audit.record(charge_id, operation, OutcomeStatus::Failure, error.to_string());
        NotificationOutcome::failure(error.to_string())
    }
}
