use crate::charge::request_builder::{build_apm_charge, build_card_charge, build_customer_request, BuiltCharge, ChargeInput};
use crate::charge::strategy::{select_card_strategy, ChargeStrategy, PaymentMethod};
use crate::domain::extension::{
    MakePaymentRequest, OutcomeStatus, PreChargeRequest, VaultTokenRequest, USER_NOT_AUTHORIZED,
};
use crate::domain::merchant_config::{ApmKind, CardSettings, MerchantConfig};
use crate::domain::payment::Payment;
use crate::error::ConnectorError;
use crate::gateways::api::PowerboardApi;
use crate::gateways::GatewayClient;
use crate::repo::audit_log::AuditLog;
use crate::repo::fraud_cache::FraudCache;
use crate::repo::token_store::{SaveOutcome, TokenStore};
use crate::service::order_sync::OrderStateSync;
use crate::status::mapper::{states_for_tag, status_after_charge};
use crate::status::GatewayStatus;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

const CHARGE_CREATED: &str = "Charge is created successfully";

/// Result of a make-payment run. `gateway_status` is the tag to persist; it
/// is absent only when nothing was attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    pub charge_id: Option<String>,
    pub gateway_status: Option<GatewayStatus>,
}

impl ChargeOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            message: message.into(),
            charge_id: None,
            gateway_status: Some(GatewayStatus::Failed),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Envelope returned by the token and wallet handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "chargeId", skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TokenOutcome {
    fn token(token: String) -> Self {
        Self {
            status: OutcomeStatus::Success,
            token: Some(token),
            charge_id: None,
            message: None,
        }
    }

    fn failed(error: &ConnectorError) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            token: None,
            charge_id: None,
            message: Some(error.to_string()),
        }
    }
}

/// Whether a freshly vaulted instrument should be stored on the shopper's
/// account. Cards additionally need card saving enabled by the merchant.
pub fn should_save_vault_token(is_card: bool, save_requested: bool, user_id: Option<&str>, card: &CardSettings) -> bool {
    user_id.is_some() && save_requested && (!is_card || card.card_save)
}

/// Tag recorded right after the charge call for a given flow.
pub fn post_charge_status(strategy: ChargeStrategy, direct_charge: bool, success: bool) -> GatewayStatus {
    match (strategy.awaits_fraud_verdict(), success) {
        (true, true) => GatewayStatus::Pending,
        (true, false) => GatewayStatus::Failed,
        (false, _) => status_after_charge(direct_charge, success),
    }
}

#[derive(Clone)]
pub struct ChargeOrchestrator {
    pub gateway: Arc<dyn GatewayClient>,
    pub tokens: TokenStore,
    pub fraud_cache: FraudCache,
    pub orders: OrderStateSync,
}

impl ChargeOrchestrator {
    pub fn new(gateway: Arc<dyn GatewayClient>, tokens: TokenStore, fraud_cache: FraudCache, orders: OrderStateSync) -> Self {
        Self {
            gateway,
            tokens,
            fraud_cache,
            orders,
        }
    }

    fn api(&self, config: &MerchantConfig) -> PowerboardApi<'_> {
        PowerboardApi::new(self.gateway.as_ref(), config.connection())
    }

    /// Runs the charge for a make-payment request. Never fails: every error
    /// inside a flow becomes a `Failure` outcome. The order state push and
    /// the audit entry happen regardless of the outcome.
    pub async fn make_payment(
        &self,
        config: &MerchantConfig,
        payment: &Payment,
        request: &MakePaymentRequest,
        audit: &mut AuditLog,
    ) -> ChargeOutcome {
        let payment_type = request.payment_type.clone().unwrap_or_default();
        let Some(method) = PaymentMethod::parse(&payment_type) else {
            let outcome = ChargeOutcome {
                status: OutcomeStatus::Error,
                message: format!("Unknown payment type: {payment_type}"),
                charge_id: None,
                gateway_status: None,
            };
            tracing::warn!(payment_id = %payment.id, payment_type = %payment_type, "unknown payment type");
            audit.record("0", "Create Charge", outcome.status, outcome.message.clone());
            return outcome;
        };

        let result = match method {
            PaymentMethod::Card => self.card_flow(config, payment, request, audit).await,
            PaymentMethod::Apm(kind) => self.apm_flow(config, payment, request, kind).await,
            PaymentMethod::Wallet(_) => Ok(wallet_outcome(request)),
        };
        let outcome = result.unwrap_or_else(|e| {
            tracing::error!(payment_id = %payment.id, payment_type = %payment_type, error = %e, "charge flow failed");
            ChargeOutcome::failure(e.to_string())
        });

        if let Some(tag) = outcome.gateway_status {
            let (payment_state, order_state) = states_for_tag(tag);
            self.orders.push_logged(&payment.id, payment_state, order_state).await;
        }
        audit.record(
            outcome.charge_id.clone().unwrap_or_else(|| "0".to_string()),
            outcome
                .gateway_status
                .map(|tag| tag.persisted())
                .unwrap_or_else(|| "Create Charge".to_string()),
            outcome.status,
            outcome.message.clone(),
        );
        outcome
    }

    async fn card_flow(
        &self,
        config: &MerchantConfig,
        payment: &Payment,
        request: &MakePaymentRequest,
        audit: &mut AuditLog,
    ) -> Result<ChargeOutcome, ConnectorError> {
        let card = config.active().card();
        if !card.use_on_checkout {
            return Ok(ChargeOutcome::failure("Card payments are disabled"));
        }
        let api = self.api(config);
        let user_id = request.authenticated_user();

        let vault_token = match request.supplied_vault_token() {
            Some(token) => token.to_string(),
            None => {
                let data = json!({ "token": request.transaction_token.clone().unwrap_or_default() });
                let created = api.create_vault_token(&data).await?;
                if let Some(user) = user_id.filter(|_| should_save_vault_token(true, request.save_card, user_id, &card)) {
                    let saved = self.tokens.save_token(&created, user, None).await;
                    if !saved.success {
                        tracing::warn!(payment_id = %payment.id, error = ?saved.error, "vault token not saved");
                    }
                }
                created.vault_token
            }
        };

        let mut customer_id = match user_id {
            Some(user) => self
                .tokens
                .find_customer_id_by_token(user, &vault_token)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(payment_id = %payment.id, error = %e, "customer lookup failed");
                    None
                }),
            None => None,
        };

        let strategy = select_card_strategy(&card, customer_id.is_some(), request.save_card);
        tracing::info!(payment_id = %payment.id, strategy = strategy.name(), "card charge strategy selected");

        match strategy {
            ChargeStrategy::CustomerCharge if customer_id.is_none() => {
                match self.create_customer(&api, &card, request, &vault_token, audit).await {
                    Some(id) => customer_id = Some(id),
                    None => return Ok(ChargeOutcome::failure("Customer could not be created")),
                }
            }
            ChargeStrategy::SaveVaultTokenThenCharge => {
                if let Some(user) = user_id {
                    let data = api.vault_token_data(&vault_token).await?;
                    let saved = self.tokens.save_token(&data, user, None).await;
                    if !saved.success {
                        tracing::warn!(payment_id = %payment.id, error = ?saved.error, "vault token not saved");
                    }
                }
            }
            _ => {}
        }

        let input = charge_input(payment, request, Some(vault_token.clone()), customer_id.clone());
        let built = build_card_charge(strategy, &card, &input);
        let outcome = self.charge(&api, payment, built).await?;

        // the token itself is only linked to the shopper when they asked to save it
        let links_customer = card.card_save && card.card_method_save.creates_customer();
        if outcome.is_success() && strategy.creates_customer_on_success() && customer_id.is_none() && links_customer {
            self.create_customer(&api, &card, request, &vault_token, audit).await;
        }
        Ok(outcome)
    }

    async fn apm_flow(
        &self,
        config: &MerchantConfig,
        payment: &Payment,
        request: &MakePaymentRequest,
        kind: ApmKind,
    ) -> Result<ChargeOutcome, ConnectorError> {
        let settings = config.active().apm(kind);
        let mut input = charge_input(payment, request, None, None);
        input.apm_token = request.transaction_token.clone();
        let built = build_apm_charge(&settings, kind == ApmKind::AfterpayV1, &input);
        self.charge(&self.api(config), payment, built).await
    }

    async fn charge(&self, api: &PowerboardApi<'_>, payment: &Payment, built: BuiltCharge) -> Result<ChargeOutcome, ConnectorError> {
        let response = api.charge(&built.endpoint, &built.request).await;
        let success = response.is_success();
        let tag = post_charge_status(built.strategy, built.direct_charge, success);
        if !success {
            let message = response.error_message();
            tracing::warn!(
                payment_id = %payment.id,
                strategy = built.strategy.name(),
                status = ?response.status,
                error = %message,
                "gateway rejected charge"
            );
            return Ok(ChargeOutcome {
                status: OutcomeStatus::Failure,
                message,
                charge_id: Some("0".to_string()),
                gateway_status: Some(tag),
            });
        }

        let charge_id = response.charge_id().map(ToString::to_string);
        if let Some(entry) = &built.fraud_cache {
            self.fraud_cache.store(&built.request.reference, entry).await?;
        }
        tracing::info!(
            payment_id = %payment.id,
            strategy = built.strategy.name(),
            charge_id = charge_id.as_deref().unwrap_or_default(),
            status = %tag,
            "charge created"
        );
        Ok(ChargeOutcome {
            status: OutcomeStatus::Success,
            message: CHARGE_CREATED.to_string(),
            charge_id,
            gateway_status: Some(tag),
        })
    }

    /// Creates the gateway customer for a vault token and, when the shopper
    /// asked for it, links the token to their account. Both steps are
    /// audited; failures are not raised.
    async fn create_customer(
        &self,
        api: &PowerboardApi<'_>,
        card: &CardSettings,
        request: &MakePaymentRequest,
        vault_token: &str,
        audit: &mut AuditLog,
    ) -> Option<String> {
        let charge_ref = request.transaction_token.clone().unwrap_or_default();
        let customer_request = build_customer_request(card, &request.billing(), vault_token);
        let customer_id = match api.create_customer(&customer_request).await {
            Ok(id) => {
                audit.record(&charge_ref, "Create Customer", OutcomeStatus::Success, format!("Create Customer {id}"));
                id
            }
            Err(e) => {
                tracing::warn!(error = %e, "gateway customer not created");
                audit.record(&charge_ref, "Create Customer", OutcomeStatus::Failure, e.to_string());
                return None;
            }
        };

        let user_id = request.authenticated_user();
        if let Some(user) = user_id.filter(|_| should_save_vault_token(true, request.save_card, user_id, card)) {
            let saved = match api.vault_token_data(vault_token).await {
                Ok(data) => self.tokens.save_token(&data, user, Some(&customer_id)).await,
                Err(e) => SaveOutcome {
                    success: false,
                    error: Some(e.to_string()),
                },
            };
            let (status, message) = if saved.success {
                (OutcomeStatus::Success, "Customer Vault Token saved successfully".to_string())
            } else {
                (OutcomeStatus::Failure, saved.error.unwrap_or_default())
            };
            audit.record(&charge_ref, "Save Customer Vault Token", status, message);
        }
        Some(customer_id)
    }

    /// Vaults raw instrument data from the widget, saving the token to the
    /// shopper's account when requested.
    pub async fn vault_token(&self, config: &MerchantConfig, request: &VaultTokenRequest) -> TokenOutcome {
        let created = match self.api(config).create_vault_token(&request.data).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(error = %e, "vault token not created");
                return TokenOutcome::failed(&e);
            }
        };
        let user_id = request
            .user_id
            .as_deref()
            .filter(|u| !u.is_empty() && *u != USER_NOT_AUTHORIZED);
        let is_card = request.token_type.as_deref().unwrap_or("card") == "card";
        let card = config.active().card();
        if let Some(user) = user_id.filter(|_| should_save_vault_token(is_card, request.save_card, user_id, &card)) {
            let saved = self.tokens.save_token(&created, user, None).await;
            if !saved.success {
                tracing::warn!(user_id = user, error = ?saved.error, "vault token not saved");
            }
        }
        TokenOutcome::token(created.vault_token)
    }

    pub async fn standalone_3ds_token(&self, config: &MerchantConfig, data: &Value) -> TokenOutcome {
        match self.api(config).standalone_3ds_token(data).await {
            Ok(token) => TokenOutcome::token(token),
            Err(e) => {
                tracing::warn!(error = %e, "standalone 3DS token not created");
                TokenOutcome::failed(&e)
            }
        }
    }

    /// Wallet pre-authorisation for Apple Pay, Google Pay and friends.
    pub async fn pre_charge(&self, config: &MerchantConfig, request: &PreChargeRequest) -> TokenOutcome {
        match self.api(config).wallet_charge(&request.data, request.capture).await {
            Ok((token, charge_id)) => TokenOutcome {
                status: OutcomeStatus::Success,
                token: Some(token),
                charge_id: Some(charge_id),
                message: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "wallet pre-charge failed");
                TokenOutcome::failed(&e)
            }
        }
    }
}

fn charge_input(
    payment: &Payment,
    request: &MakePaymentRequest,
    vault_token: Option<String>,
    customer_id: Option<String>,
) -> ChargeInput {
    ChargeInput {
        reference: request.order_id.clone().unwrap_or_else(|| payment.id.clone()),
        amount: payment.amount_planned.decimal_amount(),
        currency: request.currency(),
        billing: request.billing(),
        vault_token,
        customer_id,
        cvv: request.cvv.clone(),
        charge_3ds_id: request.charge_3ds_id.clone(),
        apm_token: None,
        items: request.items.clone(),
    }
}

/// Wallet charges already happened in the browser; the widget reports the
/// resulting status and charge id.
fn wallet_outcome(request: &MakePaymentRequest) -> ChargeOutcome {
    let tag = request
        .payment_status
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(GatewayStatus::Pending);
    ChargeOutcome {
        status: OutcomeStatus::Success,
        message: "Create Charge".to_string(),
        charge_id: request.charge_id.clone(),
        gateway_status: Some(tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::merchant_config::CardSaveMethod;

    #[test]
    fn fraud_deferred_success_stays_pending() {
        assert_eq!(post_charge_status(ChargeStrategy::StandaloneFraud, true, true), GatewayStatus::Pending);
        assert_eq!(post_charge_status(ChargeStrategy::InBuiltFraud, false, true), GatewayStatus::Pending);
        assert_eq!(post_charge_status(ChargeStrategy::InBuiltFraud, true, false), GatewayStatus::Failed);
        assert_eq!(post_charge_status(ChargeStrategy::InBuilt3ds, false, true), GatewayStatus::Authorize);
        assert_eq!(post_charge_status(ChargeStrategy::VaultTokenCharge, true, true), GatewayStatus::Paid);
    }

    #[test]
    fn guests_never_save_tokens() {
        let card = CardSettings {
            card_save: true,
            card_method_save: CardSaveMethod::VaultToken,
            ..CardSettings::default()
        };
        assert!(should_save_vault_token(true, true, Some("u1"), &card));
        assert!(!should_save_vault_token(true, true, None, &card));
        assert!(!should_save_vault_token(true, false, Some("u1"), &card));
        assert!(!should_save_vault_token(true, true, Some("u1"), &CardSettings::default()));
        assert!(should_save_vault_token(false, true, Some("u1"), &CardSettings::default()));
    }

    #[test]
    fn wallet_outcome_echoes_widget_status() {
        let request = MakePaymentRequest {
            payment_status: Some("powerboard-authorize".to_string()),
            charge_id: Some("ch_9".to_string()),
            ..Default::default()
        };
        let outcome = wallet_outcome(&request);
        assert_eq!(outcome.gateway_status, Some(GatewayStatus::Authorize));
        assert_eq!(outcome.charge_id.as_deref(), Some("ch_9"));
        assert!(outcome.is_success());
    }
}
