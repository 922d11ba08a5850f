//! Merchant configuration as edited in the merchant center: flat string maps
//! for the `live`, `sandbox` and `widget` groups, with typed views over the
//! settings the charge path reads.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreeDsMode {
    Disabled,
    InBuilt,
    Standalone,
}

impl ThreeDsMode {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("In-built 3DS") => ThreeDsMode::InBuilt,
            Some("Standalone 3DS") => ThreeDsMode::Standalone,
            _ => ThreeDsMode::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FraudMode {
    Disabled,
    InBuilt,
    Standalone,
}

impl FraudMode {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("In-built Fraud") => FraudMode::InBuilt,
            Some("Standalone Fraud") => FraudMode::Standalone,
            _ => FraudMode::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSaveMethod {
    VaultToken,
    CustomerWithGatewayId,
    CustomerWithoutGatewayId,
}

impl CardSaveMethod {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("Customer with Gateway ID") => CardSaveMethod::CustomerWithGatewayId,
            Some("Customer without Gateway ID") => CardSaveMethod::CustomerWithoutGatewayId,
            _ => CardSaveMethod::VaultToken,
        }
    }

    pub fn creates_customer(self) -> bool {
        !matches!(self, CardSaveMethod::VaultToken)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreeDsFlow {
    WithVault,
    WithOtt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsType {
    /// Secret key sent as `x-user-secret-key`.
    SecretKey,
    /// Access token sent as `x-access-token`.
    AccessKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSettings {
    pub use_on_checkout: bool,
    pub gateway_id: Option<String>,
    pub three_ds: ThreeDsMode,
    pub three_ds_service_id: Option<String>,
    pub three_ds_flow: ThreeDsFlow,
    pub fraud: FraudMode,
    pub fraud_service_id: Option<String>,
    pub direct_charge: bool,
    pub card_save: bool,
    pub card_method_save: CardSaveMethod,
}

impl Default for CardSettings {
    fn default() -> Self {
        Self {
            use_on_checkout: false,
            gateway_id: None,
            three_ds: ThreeDsMode::Disabled,
            three_ds_service_id: None,
            three_ds_flow: ThreeDsFlow::WithVault,
            fraud: FraudMode::Disabled,
            fraud_service_id: None,
            direct_charge: true,
            card_save: false,
            card_method_save: CardSaveMethod::VaultToken,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApmSettings {
    pub use_on_checkout: bool,
    pub gateway_id: Option<String>,
    pub fraud: bool,
    pub fraud_service_id: Option<String>,
    pub direct_charge: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApmKind {
    Zippay,
    AfterpayV1,
}

impl ApmKind {
    pub fn config_name(self) -> &'static str {
        match self {
            ApmKind::Zippay => "zippay",
            ApmKind::AfterpayV1 => "afterpay_v1",
        }
    }
}

/// One connection group (`live` or `sandbox`) with credentials already decrypted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionProfile {
    pub raw: Map<String, Value>,
}

impl ConnectionProfile {
    pub fn new(raw: Map<String, Value>) -> Self {
        Self { raw }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn is(&self, key: &str, expected: &str) -> bool {
        self.get(key) == Some(expected)
    }

    fn owned(&self, key: &str) -> Option<String> {
        self.get(key).map(ToString::to_string)
    }

    pub fn credentials_type(&self) -> CredentialsType {
        if self.is("credentials_type", "credentials") {
            CredentialsType::SecretKey
        } else {
            CredentialsType::AccessKey
        }
    }

    pub fn card(&self) -> CardSettings {
        CardSettings {
            use_on_checkout: self.is("card_use_on_checkout", "Yes"),
            gateway_id: self.owned("card_gateway_id"),
            three_ds: ThreeDsMode::parse(self.get("card_3ds")),
            three_ds_service_id: self.owned("card_3ds_service_id"),
            three_ds_flow: if self.is("card_3ds_flow", "With OTT") {
                ThreeDsFlow::WithOtt
            } else {
                ThreeDsFlow::WithVault
            },
            fraud: FraudMode::parse(self.get("card_fraud")),
            fraud_service_id: self.owned("card_fraud_service_id"),
            direct_charge: self.is("card_direct_charge", "Enable"),
            card_save: self.is("card_card_save", "Enable"),
            card_method_save: CardSaveMethod::parse(self.get("card_card_method_save")),
        }
    }

    pub fn apm(&self, kind: ApmKind) -> ApmSettings {
        let key = |suffix: &str| format!("alternative_payment_methods_{}_{suffix}", kind.config_name());
        ApmSettings {
            use_on_checkout: self.is(&key("use_on_checkout"), "Yes"),
            gateway_id: self.owned(&key("gateway_id")),
            fraud: self.is(&key("fraud"), "Enable"),
            fraud_service_id: self.owned(&key("fraud_service_id")),
            direct_charge: self.is(&key("direct_charge"), "Enable"),
        }
    }
}

/// Everything needed to reach the gateway for the active profile.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConnection {
    pub base_url: String,
    pub credentials_type: CredentialsType,
    pub secret: String,
}

impl std::fmt::Debug for GatewayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConnection")
            .field("base_url", &self.base_url)
            .field("credentials_type", &self.credentials_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MerchantConfig {
    pub live: ConnectionProfile,
    pub sandbox: ConnectionProfile,
    pub widget: Map<String, Value>,
    pub live_url: String,
    pub sandbox_url: String,
}

impl MerchantConfig {
    pub fn sandbox_mode(&self) -> bool {
        self.sandbox.is("sandbox_mode", "Yes")
    }

    pub fn active(&self) -> &ConnectionProfile {
        if self.sandbox_mode() {
            &self.sandbox
        } else {
            &self.live
        }
    }

    pub fn api_url(&self) -> &str {
        if self.sandbox_mode() {
            &self.sandbox_url
        } else {
            &self.live_url
        }
    }

    pub fn connection(&self) -> GatewayConnection {
        let profile = self.active();
        let credentials_type = profile.credentials_type();
        let secret = match credentials_type {
            CredentialsType::SecretKey => profile.get("credentials_secret_key"),
            CredentialsType::AccessKey => profile.get("credentials_access_key"),
        };
        GatewayConnection {
            base_url: self.api_url().trim_end_matches('/').to_string(),
            credentials_type,
            secret: secret.unwrap_or_default().to_string(),
        }
    }
}
