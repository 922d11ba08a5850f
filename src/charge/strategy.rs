use crate::domain::merchant_config::{ApmKind, CardSaveMethod, CardSettings, FraudMode, ThreeDsMode};

/// `PowerboardPaymentType` values the widget sends with a make-payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Card,
    Apm(ApmKind),
    /// Charged client-side by the widget; only the outcome is recorded.
    Wallet(WalletKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletKind {
    PayPalSmart,
    GooglePay,
    ApplePay,
    AfterpayV2,
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "card" => PaymentMethod::Card,
            "Zippay" => PaymentMethod::Apm(ApmKind::Zippay),
            "Afterpay v1" => PaymentMethod::Apm(ApmKind::AfterpayV1),
            "PayPal Smart" => PaymentMethod::Wallet(WalletKind::PayPalSmart),
            "Google Pay" => PaymentMethod::Wallet(WalletKind::GooglePay),
            "Apple Pay" => PaymentMethod::Wallet(WalletKind::ApplePay),
            "Afterpay v2" => PaymentMethod::Wallet(WalletKind::AfterpayV2),
            _ => return None,
        })
    }
}

/// The charge flows a payment can take. Card payments pick exactly one via
/// [`select_card_strategy`]; Zippay and Afterpay v1 always use
/// `AlternativePaymentMethod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChargeStrategy {
    CustomerCharge,
    InBuilt3dsInBuiltFraud,
    Standalone3dsStandaloneFraud,
    InBuilt3dsStandaloneFraud,
    Standalone3dsInBuiltFraud,
    InBuilt3ds,
    Standalone3ds,
    InBuiltFraud,
    StandaloneFraud,
    SaveVaultTokenThenCharge,
    VaultTokenCharge,
    AlternativePaymentMethod,
}

impl ChargeStrategy {
    /// Flows whose charge is deferred until a fraud verdict webhook arrives.
    pub fn defers_to_fraud_check(self) -> bool {
        matches!(
            self,
            ChargeStrategy::StandaloneFraud
                | ChargeStrategy::Standalone3dsStandaloneFraud
                | ChargeStrategy::InBuilt3dsStandaloneFraud
        )
    }

    /// Flows after which a successful charge may create a gateway customer
    /// for a shopper who asked to save the card.
    pub fn creates_customer_on_success(self) -> bool {
        matches!(
            self,
            ChargeStrategy::InBuilt3dsInBuiltFraud
                | ChargeStrategy::Standalone3dsStandaloneFraud
                | ChargeStrategy::InBuilt3dsStandaloneFraud
                | ChargeStrategy::Standalone3dsInBuiltFraud
                | ChargeStrategy::InBuilt3ds
                | ChargeStrategy::Standalone3ds
                | ChargeStrategy::InBuiltFraud
                | ChargeStrategy::StandaloneFraud
        )
    }

    /// Flows whose success only means the fraud decision is outstanding, so
    /// the payment stays pending until a webhook settles it.
    pub fn awaits_fraud_verdict(self) -> bool {
        self.defers_to_fraud_check() || self == ChargeStrategy::InBuiltFraud
    }

    pub fn name(self) -> &'static str {
        match self {
            ChargeStrategy::CustomerCharge => "cardCustomerCharge",
            ChargeStrategy::InBuilt3dsInBuiltFraud => "cardFraud3DsInBuildCharge",
            ChargeStrategy::Standalone3dsStandaloneFraud => "cardFraud3DsStandaloneCharge",
            ChargeStrategy::InBuilt3dsStandaloneFraud => "cardFraudStandalone3DsInBuildCharge",
            ChargeStrategy::Standalone3dsInBuiltFraud => "cardFraudInBuild3DsStandaloneCharge",
            ChargeStrategy::InBuilt3ds => "card3DsInBuildCharge",
            ChargeStrategy::Standalone3ds => "card3DsStandaloneCharge",
            ChargeStrategy::InBuiltFraud => "cardFraudInBuildCharge",
            ChargeStrategy::StandaloneFraud => "cardFraudStandaloneCharge",
            ChargeStrategy::SaveVaultTokenThenCharge => "cardSaveVaultTokenCharge",
            ChargeStrategy::VaultTokenCharge => "cardCharge",
            ChargeStrategy::AlternativePaymentMethod => "apmCharge",
        }
    }
}

/// First match wins: customer charge, combined 3DS and fraud, 3DS alone,
/// fraud alone, save-then-charge, plain charge.
pub fn select_card_strategy(card: &CardSettings, has_customer: bool, save_requested: bool) -> ChargeStrategy {
    use ChargeStrategy as S;

    let saves_via_customer = card.card_method_save != CardSaveMethod::VaultToken && save_requested;
    if card.card_save && (has_customer || saves_via_customer) {
        return S::CustomerCharge;
    }

    match (card.three_ds, card.fraud) {
        (ThreeDsMode::InBuilt, FraudMode::InBuilt) => return S::InBuilt3dsInBuiltFraud,
        (ThreeDsMode::Standalone, FraudMode::Standalone) => return S::Standalone3dsStandaloneFraud,
        (ThreeDsMode::InBuilt, FraudMode::Standalone) => return S::InBuilt3dsStandaloneFraud,
        (ThreeDsMode::Standalone, FraudMode::InBuilt) => return S::Standalone3dsInBuiltFraud,
        (ThreeDsMode::InBuilt, FraudMode::Disabled) => return S::InBuilt3ds,
        (ThreeDsMode::Standalone, FraudMode::Disabled) => return S::Standalone3ds,
        (ThreeDsMode::Disabled, FraudMode::InBuilt) => return S::InBuiltFraud,
        (ThreeDsMode::Disabled, FraudMode::Standalone) => return S::StandaloneFraud,
        (ThreeDsMode::Disabled, FraudMode::Disabled) => {}
    }

    if card.card_save && card.card_method_save == CardSaveMethod::VaultToken && save_requested {
        S::SaveVaultTokenThenCharge
    } else {
        S::VaultTokenCharge
    }
}
