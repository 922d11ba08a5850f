use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("concurrent modification (current version {current_version:?})")]
    ConcurrentModification { current_version: Option<i64> },

    #[error("commerce API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("commerce API unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected commerce API payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CommerceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CommerceError::ConcurrentModification { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("merchant configuration unavailable: {0}")]
    MerchantConfig(String),

    #[error(transparent)]
    Commerce(#[from] CommerceError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must not be empty")]
    EmptyKey,

    #[error("malformed encrypted credential")]
    Malformed,

    #[error("credential could not be decrypted")]
    Decrypt,

    #[error("credential could not be encrypted")]
    Encrypt,
}

/// Errors surfaced to the platform by extension and webhook handlers.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("gateway unreachable: {0}")]
    Transport(String),

    #[error("gave up after repeated concurrent modifications: {0}")]
    Concurrency(String),

    #[error("{0}")]
    UnfulfilledCondition(String),

    #[error(transparent)]
    Commerce(#[from] CommerceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ConnectorError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ConnectorError::Validation {
            code: "InvalidInput",
            message: message.into(),
        }
    }

    /// Error code reported in the extension `errors` array.
    pub fn code(&self) -> &'static str {
        match self {
            ConnectorError::Validation { code, .. } => code,
            ConnectorError::UnfulfilledCondition(_) => "UnfulfilledCondition",
            ConnectorError::Commerce(CommerceError::ConcurrentModification { .. })
            | ConnectorError::Concurrency(_) => "ConcurrentModification",
            _ => "General",
        }
    }
}
