//! Checkout widget bootstrap data for `getPaymentMethods`.

use crate::domain::merchant_config::{ConnectionProfile, MerchantConfig};
use crate::repo::token_store::{group_by_type, TokenStore};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::str::FromStr;

const WIDGET_METHODS: [&str; 6] = ["card", "bank_accounts", "apple-pay", "google-pay", "afterpay_v2", "paypal_smart"];
const APM_METHODS: [(&str, &str); 2] = [
    ("afterpay_v1", "alternative_payment_method_afterpay_v1"),
    ("zippay", "alternative_payment_method_zippay"),
];

const WIDGET_STYLE_KEYS: [&str; 8] = [
    "widget_style_bg_color",
    "widget_style_text_color",
    "widget_style_border_color",
    "widget_style_error_color",
    "widget_style_success_color",
    "widget_style_font_size",
    "widget_style_font_family",
    "widget_style_custom_element",
];

/// Widget script locations from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WidgetEnvironment {
    pub widget_url: String,
    pub widget_test_url: String,
    pub type_sdk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMethodsResponse {
    pub sandbox_mode: Value,
    pub api_credentials: Value,
    pub payment_methods: Map<String, Value>,
    pub widget_configuration: Value,
    pub saved_credentials: Value,
}

fn profile_value(profile: &ConnectionProfile, key: &str) -> Value {
    profile.raw.get(key).cloned().unwrap_or(Value::Null)
}

fn widget_value(config: &MerchantConfig, key: &str) -> Value {
    config.widget.get(key).cloned().unwrap_or(Value::Null)
}

fn widget_decimal(config: &MerchantConfig, key: &str) -> Option<Decimal> {
    match config.widget.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// An alternative payment method is offered only when enabled and the order
/// total lies inside the configured bounds. Unset bounds do not restrict.
pub fn apm_available(config: &MerchantConfig, method: &str, method_key: &str, total: Decimal) -> bool {
    let enabled = config
        .active()
        .get(&format!("alternative_payment_methods_{method}_use_on_checkout"))
        == Some("Yes");
    let min = widget_decimal(config, &format!("payment_methods_{method_key}_min_value"));
    let max = widget_decimal(config, &format!("payment_methods_{method_key}_max_value"));
    enabled && min.map_or(true, |min| total >= min) && max.map_or(true, |max| total <= max)
}

fn method_config(config: &MerchantConfig, method: &str) -> Value {
    let profile = config.active();
    let mut settings = Map::new();
    for suffix in ["use_on_checkout", "gateway_id", "fraud", "fraud_service_id", "direct_charge"] {
        let key = format!("{method}_{suffix}");
        settings.insert(key.clone(), profile_value(profile, &key));
    }
    let optional: [(&str, &[&str]); 3] = [
        ("3ds", &["3ds", "3ds_service_id", "3ds_flow"]),
        ("supported_card_schemes", &["supported_card_schemes"]),
        ("card_save", &["card_save", "card_method_save"]),
    ];
    for (trigger, keys) in optional {
        if profile.get(&format!("{method}_{trigger}")).is_some() {
            for suffix in keys {
                let key = format!("{method}_{suffix}");
                settings.insert(key.clone(), profile_value(profile, &key));
            }
        }
    }
    json!({
        "name": format!("powerboard-pay-{method}"),
        "type": method,
        "title": widget_value(config, &format!("payment_methods_{method}_title")),
        "description": widget_value(config, &format!("payment_methods_{method}_description")),
        "config": settings,
    })
}

fn apm_config(config: &MerchantConfig, method: &str, method_key: &str, total: Decimal) -> Value {
    let profile = config.active();
    let prefix = format!("alternative_payment_methods_{method}");
    let available = if apm_available(config, method, method_key, total) { "Yes" } else { "No" };
    let mut settings = Map::new();
    settings.insert(format!("{prefix}_use_on_checkout"), Value::from(available));
    for suffix in ["gateway_id", "fraud", "direct_charge", "fraud_service_id"] {
        let key = format!("{prefix}_{suffix}");
        settings.insert(key.clone(), profile_value(profile, &key));
    }
    json!({
        "name": format!("powerboard-pay-{method}"),
        "type": method,
        "title": widget_value(config, &format!("payment_methods_{method_key}_title")),
        "description": widget_value(config, &format!("payment_methods_{method_key}_description")),
        "config": settings,
    })
}

fn widget_group(config: &MerchantConfig, keys: &[&str]) -> Value {
    keys.iter()
        .map(|key| (key.to_string(), widget_value(config, key)))
        .collect::<Map<String, Value>>()
        .into()
}

fn widget_configuration(config: &MerchantConfig, environment: &WidgetEnvironment) -> Value {
    json!({
        "config": environment,
        "version": widget_group(config, &["version_version", "version_custom_version"]),
        "payment_methods": {
            "cards": widget_group(config, &["payment_methods_cards_title", "payment_methods_cards_description"]),
            "bank_accounts": widget_group(
                config,
                &["payment_methods_bank_accounts_title", "payment_methods_bank_accounts_description"],
            ),
            "wallets": widget_group(config, &[
                "payment_methods_wallets_apple_pay_title",
                "payment_methods_wallets_apple_pay_description",
                "payment_methods_wallets_google_pay_title",
                "payment_methods_wallets_google_pay_description",
                "payment_methods_wallets_afterpay_v2_title",
                "payment_methods_wallets_afterpay_v2_description",
                "payment_methods_wallets_paypal_title",
                "payment_methods_wallets_paypal_description",
            ]),
            "alternative_payment_methods": widget_group(config, &[
                "payment_methods_alternative_payment_method_afterpay_v1_title",
                "payment_methods_alternative_payment_method_afterpay_v1_description",
                "payment_methods_alternative_payment_method_zip_title",
                "payment_methods_alternative_payment_method_zip_description",
            ]),
        },
        "widget_style": widget_group(config, &WIDGET_STYLE_KEYS),
    })
}

/// Builds the response without the shopper's saved instruments.
pub fn payment_methods_response(
    config: &MerchantConfig,
    environment: &WidgetEnvironment,
    total: Decimal,
    saved_credentials: Value,
) -> PaymentMethodsResponse {
    let profile = config.active();
    let mut payment_methods = Map::new();
    for method in WIDGET_METHODS {
        payment_methods.insert(method.to_string(), method_config(config, method));
    }
    for (method, key) in APM_METHODS {
        payment_methods.insert(method.to_string(), apm_config(config, method, key, total));
    }
    PaymentMethodsResponse {
        sandbox_mode: profile_value(&config.sandbox, "sandbox_mode"),
        api_credentials: json!({
            "credentials_type": profile_value(profile, "credentials_type"),
            "credentials_public_key": profile_value(profile, "credentials_public_key"),
            "credentials_widget_access_key": profile_value(profile, "credentials_widget_access_key"),
        }),
        payment_methods,
        widget_configuration: widget_configuration(config, environment),
        saved_credentials,
    }
}

#[derive(Clone)]
pub struct PaymentMethodsService {
    pub tokens: TokenStore,
    pub environment: WidgetEnvironment,
}

impl PaymentMethodsService {
    pub async fn describe(&self, config: &MerchantConfig, user_id: Option<&str>, total: Decimal) -> PaymentMethodsResponse {
        let saved = match user_id {
            Some(user) => match self.tokens.list_tokens(user).await {
                Ok(tokens) => serde_json::to_value(group_by_type(tokens)).unwrap_or_else(|_| json!({})),
                Err(e) => {
                    tracing::warn!(user_id = user, error = %e, "saved instruments unavailable");
                    json!({})
                }
            },
            None => json!({}),
        };
        payment_methods_response(config, &self.environment, total, saved)
    }
}
