pub mod mapper;
pub mod transitions;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const PERSISTED_PREFIX: &str = "powerboard-";

/// Connector-level payment status, persisted on the payment as
/// `powerboard-<tag>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayStatus {
    Requested,
    Pending,
    Authorize,
    PartialPaid,
    Paid,
    PartialRefund,
    Refunded,
    Cancelled,
    Failed,
}

impl GatewayStatus {
    pub const ALL: [GatewayStatus; 9] = [
        GatewayStatus::Requested,
        GatewayStatus::Pending,
        GatewayStatus::Authorize,
        GatewayStatus::PartialPaid,
        GatewayStatus::Paid,
        GatewayStatus::PartialRefund,
        GatewayStatus::Refunded,
        GatewayStatus::Cancelled,
        GatewayStatus::Failed,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            GatewayStatus::Requested => "requested",
            GatewayStatus::Pending => "pending",
            GatewayStatus::Authorize => "authorize",
            GatewayStatus::PartialPaid => "p-paid",
            GatewayStatus::Paid => "paid",
            GatewayStatus::PartialRefund => "p-refund",
            GatewayStatus::Refunded => "refunded",
            GatewayStatus::Cancelled => "cancelled",
            GatewayStatus::Failed => "failed",
        }
    }

    pub fn persisted(self) -> String {
        format!("{PERSISTED_PREFIX}{}", self.tag())
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.persisted())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown payment status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for GatewayStatus {
    type Err = UnknownStatus;

    /// Accepts both the bare tag and the persisted `powerboard-` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let tag = trimmed.strip_prefix(PERSISTED_PREFIX).unwrap_or(trimmed);
        GatewayStatus::ALL
            .into_iter()
            .find(|status| status.tag() == tag)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl Serialize for GatewayStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.persisted())
    }
}

impl<'de> Deserialize<'de> for GatewayStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
