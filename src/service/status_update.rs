//! Merchant-initiated capture, cancel and refund from the back-office.

use crate::domain::extension::{OutcomeStatus, UpdateStatusRequest};
use crate::domain::merchant_config::MerchantConfig;
use crate::domain::payment::{
    decimal_from_value, decimal_to_value, Payment, UpdateAction, FIELD_CAPTURED_AMOUNT, FIELD_EXTENSION_RESPONSE,
    FIELD_REFUNDED_AMOUNT,
};
use crate::error::ConnectorError;
use crate::gateways::api::PowerboardApi;
use crate::gateways::{GatewayClient, HttpMethod};
use crate::repo::audit_log::AuditLog;
use crate::service::order_sync::OrderStateSync;
use crate::service::reconciler::MERCHANT_REFUND_MESSAGE;
use crate::status::mapper::{accumulate_refund, states_for_tag};
use crate::status::GatewayStatus;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

/// Gateway operation behind a back-office status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Capture,
    /// Releases an authorisation that was never captured.
    CancelAuthorization,
    CancelCharge,
    Refund,
}

impl StatusChange {
    fn request(self, charge_id: &str) -> (HttpMethod, String) {
        match self {
            StatusChange::Capture => (HttpMethod::Post, format!("/v1/charges/{charge_id}/capture")),
            StatusChange::CancelAuthorization => (HttpMethod::Delete, format!("/v1/charges/{charge_id}/capture")),
            StatusChange::CancelCharge => (HttpMethod::Delete, format!("/v1/charges/{charge_id}")),
            StatusChange::Refund => (HttpMethod::Post, format!("/v1/charges/{charge_id}/refunds")),
        }
    }
}

pub fn plan_status_change(from: Option<GatewayStatus>, to: GatewayStatus) -> Option<StatusChange> {
    use GatewayStatus as G;
    match (from?, to) {
        (G::Authorize | G::PartialPaid, G::Paid | G::PartialPaid) => Some(StatusChange::Capture),
        (G::Authorize, G::Cancelled) => Some(StatusChange::CancelAuthorization),
        (G::Paid | G::PartialPaid, G::Cancelled) => Some(StatusChange::CancelCharge),
        (G::Paid | G::PartialPaid | G::PartialRefund, G::Refunded | G::PartialRefund) => Some(StatusChange::Refund),
        _ => None,
    }
}

fn response_action(success: bool, message: &str) -> UpdateAction {
    UpdateAction::set_json_field(FIELD_EXTENSION_RESPONSE, &json!({ "status": success, "message": message }))
}

fn status_label(status: Option<GatewayStatus>, raw: Option<&str>) -> String {
    status
        .map(|s| s.persisted())
        .or_else(|| raw.map(ToString::to_string))
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct StatusUpdateService {
    pub gateway: Arc<dyn GatewayClient>,
    pub orders: OrderStateSync,
}

impl StatusUpdateService {
    pub fn new(gateway: Arc<dyn GatewayClient>, orders: OrderStateSync) -> Self {
        Self { gateway, orders }
    }

    /// Runs the gateway call for the requested change and returns the
    /// payment actions recording it. Failures only write the response
    /// envelope `{status: false, message}`.
    pub async fn apply(
        &self,
        config: &MerchantConfig,
        payment: &Payment,
        request: &UpdateStatusRequest,
        audit: &mut AuditLog,
    ) -> Vec<UpdateAction> {
        let old_status = payment
            .gateway_status()
            .or_else(|| request.old_status.as_deref().and_then(|s| s.parse().ok()));
        let old_label = status_label(old_status, request.old_status.as_deref());
        let charge_id = payment.transaction_id().unwrap_or("0").to_string();

        let new_status = request.new_status.parse::<GatewayStatus>().ok();
        let change = new_status.and_then(|to| plan_status_change(old_status, to).map(|c| (to, c)));
        let Some((new_status, change)) = change else {
            let message = format!("Unsupported status change from {old_label} to {}", request.new_status);
            tracing::warn!(payment_id = %payment.id, from = %old_label, to = %request.new_status, "unsupported status change");
            audit.record(&charge_id, &request.new_status, OutcomeStatus::Failure, &message);
            return vec![response_action(false, &message)];
        };

        match self.execute(config, payment, request, new_status, change, &charge_id).await {
            Ok(mut applied) => {
                let message = format!("Change status from '{old_label}' to '{}'", applied.status.persisted());
                audit.record(&charge_id, applied.status.persisted(), OutcomeStatus::Success, &message);
                let envelope = if change == StatusChange::Refund { MERCHANT_REFUND_MESSAGE } else { message.as_str() };
                applied.actions.push(UpdateAction::set_status(applied.status));
                applied.actions.push(response_action(true, envelope));

                let (payment_state, order_state) = states_for_tag(applied.status);
                self.orders.push_logged(&payment.id, payment_state, order_state).await;
                tracing::info!(payment_id = %payment.id, from = %old_label, to = %applied.status, "payment status changed");
                applied.actions
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(payment_id = %payment.id, change = ?change, error = %message, "status change rejected");
                audit.record(&charge_id, new_status.persisted(), OutcomeStatus::Failure, &message);
                vec![response_action(false, &message)]
            }
        }
    }

    async fn execute(
        &self,
        config: &MerchantConfig,
        payment: &Payment,
        request: &UpdateStatusRequest,
        new_status: GatewayStatus,
        change: StatusChange,
        charge_id: &str,
    ) -> Result<AppliedChange, ConnectorError> {
        if payment.transaction_id().is_none() {
            return Err(ConnectorError::invalid_input("Payment has no Powerboard charge"));
        }
        let api = PowerboardApi::new(self.gateway.as_ref(), config.connection());
        let (method, path) = change.request(charge_id);

        match change {
            StatusChange::Capture => {
                let amount = request
                    .captured_amount
                    .as_ref()
                    .and_then(decimal_from_value)
                    .unwrap_or_else(|| payment.amount_planned.decimal_amount());
                let body = json!({ "amount": decimal_to_value(amount), "from_webhook": true });
                api.update_charge(method, &path, Some(&body)).await?;
                Ok(AppliedChange {
                    status: new_status,
                    actions: vec![UpdateAction::set_amount(FIELD_CAPTURED_AMOUNT, amount)],
                })
            }
            StatusChange::CancelAuthorization | StatusChange::CancelCharge => {
                api.update_charge(method, &path, None).await?;
                Ok(AppliedChange {
                    status: new_status,
                    actions: Vec::new(),
                })
            }
            StatusChange::Refund => {
                let refund = request
                    .refund_amount
                    .as_ref()
                    .and_then(decimal_from_value)
                    .filter(|a| *a > Decimal::ZERO)
                    .ok_or_else(|| ConnectorError::invalid_input("Refund amount is required"))?;
                let previous = payment.field_decimal(FIELD_REFUNDED_AMOUNT).unwrap_or(Decimal::ZERO);
                let outcome = accumulate_refund(previous, refund, payment.captured_or_planned());
                let body = json!({ "amount": decimal_to_value(refund), "from_webhook": true });
                api.update_charge(method, &path, Some(&body)).await?;
                Ok(AppliedChange {
                    status: outcome.status,
                    actions: vec![UpdateAction::set_amount(FIELD_REFUNDED_AMOUNT, outcome.refunded_total)],
                })
            }
        }
    }
}

struct AppliedChange {
    status: GatewayStatus,
    actions: Vec<UpdateAction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use GatewayStatus as G;

    #[test]
    fn change_table() {
        assert_eq!(plan_status_change(Some(G::Authorize), G::Paid), Some(StatusChange::Capture));
        assert_eq!(plan_status_change(Some(G::PartialPaid), G::Paid), Some(StatusChange::Capture));
        assert_eq!(plan_status_change(Some(G::Authorize), G::Cancelled), Some(StatusChange::CancelAuthorization));
        assert_eq!(plan_status_change(Some(G::Paid), G::Cancelled), Some(StatusChange::CancelCharge));
        assert_eq!(plan_status_change(Some(G::PartialRefund), G::Refunded), Some(StatusChange::Refund));
        assert_eq!(plan_status_change(Some(G::Refunded), G::Paid), None);
        assert_eq!(plan_status_change(None, G::Paid), None);
    }

    #[test]
    fn cancelling_an_authorisation_targets_the_capture() {
        let (method, path) = StatusChange::CancelAuthorization.request("ch_1");
        assert_eq!(method, HttpMethod::Delete);
        assert_eq!(path, "/v1/charges/ch_1/capture");
    }
}
