pub mod charge;
pub mod commerce;
pub mod config;
pub mod crypto;
pub mod domain {
    pub mod extension;
    pub mod merchant_config;
    pub mod notification;
    pub mod payment;
    pub mod vault;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod extension;
        pub mod notification;
        pub mod ops;
    }
    pub mod middleware {
        pub mod extension_auth;
    }
}
pub mod repo {
    pub mod audit_log;
    pub mod fraud_cache;
    pub mod merchant_config_repo;
    pub mod token_store;
}
pub mod service {
    pub mod concurrency;
    pub mod config_cache;
    pub mod dispatcher;
    pub mod make_payment;
    pub mod orchestrator;
    pub mod order_sync;
    pub mod payment_methods;
    pub mod reconciler;
    pub mod status_update;
}
pub mod status;

use axum::middleware::from_fn_with_state;
use axum::routing::{any, get, post};
use axum::Router;
use commerce::CommercePlatform;
use config::AppConfig;
use crypto::CredentialKey;
use error::ConfigError;
use gateways::GatewayClient;
use http::middleware::extension_auth::{require_extension_auth, ExtensionCredentials};
use repo::audit_log::LogContainerWriter;
use repo::fraud_cache::FraudCache;
use repo::merchant_config_repo::MerchantConfigRepo;
use repo::token_store::TokenStore;
use service::concurrency::RetryPolicy;
use service::config_cache::ConfigCache;
use service::dispatcher::ExtensionDispatcher;
use service::orchestrator::ChargeOrchestrator;
use service::order_sync::OrderStateSync;
use service::payment_methods::{PaymentMethodsService, WidgetEnvironment};
use service::reconciler::WebhookReconciler;
use service::status_update::StatusUpdateService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: ExtensionDispatcher,
    pub reconciler: WebhookReconciler,
    pub extension_credentials: ExtensionCredentials,
}

impl AppState {
    /// Wires every service over one platform client and one gateway client.
    pub fn new(
        commerce: Arc<dyn CommercePlatform>,
        gateway: Arc<dyn GatewayClient>,
        cfg: &AppConfig,
    ) -> Result<Self, ConfigError> {
        let credential_key = cfg
            .credentials_encryption_key
            .as_deref()
            .map(CredentialKey::from_base64)
            .transpose()?;
        let retry = RetryPolicy {
            max_attempts: cfg.concurrency_max_attempts,
        };

        let config_cache = ConfigCache::new(
            MerchantConfigRepo {
                commerce: commerce.clone(),
                credential_key,
                legacy_secret: cfg.ctp_client_secret.clone(),
                live_url: cfg.powerboard_live_url.clone(),
                sandbox_url: cfg.powerboard_sandbox_url.clone(),
            },
            cfg.merchant_config_ttl,
        );
        let tokens = TokenStore::new(commerce.clone(), retry);
        let fraud_cache = FraudCache::new(commerce.clone(), cfg.fraud_cache_ttl);
        let orders = OrderStateSync::new(commerce.clone(), retry);

        let dispatcher = ExtensionDispatcher {
            config: config_cache.clone(),
            orchestrator: ChargeOrchestrator::new(gateway.clone(), tokens.clone(), fraud_cache.clone(), orders.clone()),
            status_updates: StatusUpdateService::new(gateway.clone(), orders.clone()),
            payment_methods: PaymentMethodsService {
                tokens,
                environment: WidgetEnvironment {
                    widget_url: cfg.widget_url.clone(),
                    widget_test_url: cfg.widget_test_url.clone(),
                    type_sdk: cfg.widget_type_sdk.clone(),
                },
            },
        };
        let reconciler = WebhookReconciler {
            commerce: commerce.clone(),
            gateway,
            config: config_cache,
            fraud_cache,
            orders,
            log_writer: LogContainerWriter::new(commerce),
            retry,
        };

        Ok(Self {
            dispatcher,
            reconciler,
            extension_credentials: ExtensionCredentials {
                client_id: cfg.ctp_client_id.clone(),
                client_secret: cfg.ctp_client_secret.clone(),
            },
        })
    }
}

pub fn router(state: AppState) -> Router {
    let extension_routes = Router::new()
        .route("/", any(http::handlers::extension::handle_extension))
        .route("/extension", any(http::handlers::extension::handle_extension))
        .layer(from_fn_with_state(
            state.extension_credentials.clone(),
            require_extension_auth,
        ));

    Router::new()
        .route("/notification", post(http::handlers::notification::handle_notification))
        .route("/ops/readiness", get(http::handlers::ops::readiness))
        .route("/ops/liveness", get(http::handlers::ops::liveness))
        .merge(extension_routes)
        .with_state(state)
}
