use crate::domain::extension::{
    ExtensionAction, ExtensionRequest, MakePaymentRequest, PreChargeRequest, UpdateStatusRequest, VaultTokenRequest,
    USER_NOT_AUTHORIZED,
};
use crate::domain::payment::{Payment, UpdateAction, FIELD_EXTENSION_REQUEST, FIELD_EXTENSION_RESPONSE};
use crate::error::ConnectorError;
use crate::repo::audit_log::AuditLog;
use crate::service::config_cache::ConfigCache;
use crate::service::make_payment::make_payment_actions;
use crate::service::orchestrator::ChargeOrchestrator;
use crate::service::payment_methods::PaymentMethodsService;
use crate::service::status_update::StatusUpdateService;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Body returned to the platform for an extension call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtensionResponse {
    pub actions: Vec<UpdateAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionErrorItem {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionErrors {
    pub errors: Vec<ExtensionErrorItem>,
}

impl ExtensionErrors {
    pub fn single(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            errors: vec![ExtensionErrorItem {
                code,
                message: message.into(),
            }],
        }
    }

    pub fn unexpected(payment_id: &str, error: &ConnectorError) -> Self {
        Self::single(
            "General",
            format!("[powerboard-pay-integration-extension] Unexpected error (Payment ID: {payment_id}): {error}."),
        )
    }
}

fn parse_request<T: DeserializeOwned>(action: ExtensionAction, request: &Value) -> Result<T, ConnectorError> {
    serde_json::from_value(request.clone())
        .map_err(|e| ConnectorError::invalid_input(format!("invalid {} request: {e}", action.as_str())))
}

fn response_action<T: Serialize>(value: &T) -> UpdateAction {
    UpdateAction::set_json_field(FIELD_EXTENSION_RESPONSE, value)
}

#[derive(Clone)]
pub struct ExtensionDispatcher {
    pub config: ConfigCache,
    pub orchestrator: ChargeOrchestrator,
    pub status_updates: StatusUpdateService,
    pub payment_methods: PaymentMethodsService,
}

impl ExtensionDispatcher {
    /// Routes the payment's pending extension request. `Ok(None)` means there
    /// is nothing to do: no request, an unknown action, or the webhook
    /// sentinel.
    pub async fn dispatch(&self, payment: &Payment) -> Result<Option<ExtensionResponse>, ConnectorError> {
        let Some(envelope) = ExtensionRequest::of(payment) else {
            return Ok(None);
        };
        let action = match envelope.action() {
            Some(ExtensionAction::FromNotification) | None => {
                tracing::debug!(payment_id = %payment.id, action = ?envelope.action, "no extension action to run");
                return Ok(None);
            }
            Some(action) => action,
        };

        let config = self.config.merchant_config().await?;
        let mut audit = AuditLog::new();
        tracing::info!(payment_id = %payment.id, action = action.as_str(), "extension request");

        let mut actions = match action {
            ExtensionAction::GetPaymentMethods => {
                let user_id = envelope.user_id().filter(|u| *u != USER_NOT_AUTHORIZED);
                let total = payment.amount_planned.decimal_amount();
                let response = self.payment_methods.describe(&config, user_id, total).await;
                vec![response_action(&response)]
            }
            ExtensionAction::GetVaultToken => {
                let request: VaultTokenRequest = parse_request(action, &envelope.request)?;
                vec![response_action(&self.orchestrator.vault_token(&config, &request).await)]
            }
            ExtensionAction::MakePayment => {
                let request: MakePaymentRequest = parse_request(action, &envelope.request)?;
                let outcome = self.orchestrator.make_payment(&config, payment, &request, &mut audit).await;
                make_payment_actions(payment, &request, &outcome)
            }
            ExtensionAction::GetStandalone3dsToken => {
                vec![response_action(&self.orchestrator.standalone_3ds_token(&config, &envelope.request).await)]
            }
            ExtensionAction::UpdatePaymentStatus => {
                let request: UpdateStatusRequest = parse_request(action, &envelope.request)?;
                self.status_updates.apply(&config, payment, &request, &mut audit).await
            }
            ExtensionAction::MakePreCharge => {
                let request: PreChargeRequest = parse_request(action, &envelope.request)?;
                vec![response_action(&self.orchestrator.pre_charge(&config, &request).await)]
            }
            ExtensionAction::FromNotification => Vec::new(),
        };

        actions.extend(audit.to_actions());
        actions.push(UpdateAction::clear_field(FIELD_EXTENSION_REQUEST));
        Ok(Some(ExtensionResponse { actions }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_error_message_names_the_payment() {
        let errors = ExtensionErrors::unexpected("pay-1", &ConnectorError::Gateway("boom".to_string()));
        assert_eq!(errors.errors[0].code, "General");
        assert_eq!(
            errors.errors[0].message,
            "[powerboard-pay-integration-extension] Unexpected error (Payment ID: pay-1): gateway error: boom."
        );
    }

    #[test]
    fn malformed_request_is_invalid_input() {
        let err = parse_request::<UpdateStatusRequest>(ExtensionAction::UpdatePaymentStatus, &Value::from(3))
            .unwrap_err();
        assert_eq!(err.code(), "InvalidInput");
    }
}
