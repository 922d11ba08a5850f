use crate::domain::merchant_config::GatewayConnection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod api;
pub mod mock;
pub mod powerboard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayResource {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Normalized gateway response body. Transport failures are folded into the
/// same shape with no `status` and an `error` carrying the cause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub resource: Option<GatewayResource>,
    #[serde(default)]
    pub error: Option<GatewayErrorBody>,
}

impl GatewayResponse {
    pub fn created(data: Value) -> Self {
        Self {
            status: Some(201),
            resource: Some(GatewayResource { kind: None, data }),
            error: None,
        }
    }

    pub fn rejected(status: u16, message: &str) -> Self {
        Self {
            status: Some(status),
            resource: None,
            error: Some(GatewayErrorBody {
                message: Some(message.to_string()),
                ..GatewayErrorBody::default()
            }),
        }
    }

    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            status: None,
            resource: None,
            error: Some(GatewayErrorBody {
                message: Some(message.into()),
                code: Some("transport".to_string()),
                details: None,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200 | 201))
    }

    pub fn data(&self) -> Option<&Value> {
        self.resource.as_ref().map(|r| &r.data).filter(|d| !d.is_null())
    }

    /// String at a JSON pointer inside `resource.data`, e.g. `"/_3ds/token"`.
    pub fn data_str(&self, pointer: &str) -> Option<&str> {
        self.data()?.pointer(pointer)?.as_str()
    }

    pub fn charge_id(&self) -> Option<&str> {
        self.data_str("/_id").or_else(|| self.data_str("/id"))
    }

    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }

    /// Human-readable reason built from `error.details`: the first entry of
    /// `details.messages` when present, otherwise the message followed by the
    /// joined detail values.
    pub fn describe_error(&self) -> String {
        let Some(error) = &self.error else {
            return String::new();
        };
        let mut text = error.message.clone().unwrap_or_default();
        if let Some(Value::Object(details)) = &error.details {
            if let Some(first) = details
                .get("messages")
                .and_then(Value::as_array)
                .and_then(|m| m.first())
            {
                return value_text(first);
            }
            let joined = match details.values().next() {
                Some(Value::Array(items)) => items.iter().map(value_text).collect::<Vec<_>>().join(","),
                _ => details.values().map(value_text).collect::<Vec<_>>().join(","),
            };
            if !joined.is_empty() {
                text.push(' ');
                text.push_str(&joined);
            }
        }
        text.trim().to_string()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayExchange {
    pub request: Value,
    pub response: GatewayResponse,
}

#[async_trait::async_trait]
pub trait GatewayClient: Send + Sync {
    /// Never fails: transport errors come back as a [`GatewayResponse`] with
    /// no status.
    async fn call(
        &self,
        connection: &GatewayConnection,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> GatewayExchange;
}
