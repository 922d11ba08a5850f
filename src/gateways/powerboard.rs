use crate::domain::merchant_config::{CredentialsType, GatewayConnection};
use crate::gateways::{GatewayClient, GatewayExchange, GatewayResponse, HttpMethod};
use serde_json::Value;
use std::time::Duration;

const META_HEADER: &str = "X-Commercetools-Meta";
const META_VALUE: &str = "V1.0.0_commercetools";

pub struct PowerboardGateway {
    pub client: reqwest::Client,
    pub timeout: Duration,
}

impl PowerboardGateway {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait::async_trait]
impl GatewayClient for PowerboardGateway {
    async fn call(
        &self,
        connection: &GatewayConnection,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> GatewayExchange {
        let url = format!("{}{}", connection.base_url, path);
        let request_body = body.cloned().unwrap_or(Value::Null);

        let mut req = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Delete => self.client.delete(&url),
        }
        .header(META_HEADER, META_VALUE)
        .timeout(self.timeout);

        req = match connection.credentials_type {
            CredentialsType::SecretKey => req.header("x-user-secret-key", &connection.secret),
            CredentialsType::AccessKey => req.header("x-access-token", &connection.secret),
        };
        if method != HttpMethod::Get {
            if let Some(body) = body {
                req = req.json(body);
            }
        }

        let response = match req.send().await {
            Ok(resp) => {
                let http_status = resp.status();
                match resp.text().await {
                    Ok(text) if text.trim().is_empty() => GatewayResponse {
                        status: Some(http_status.as_u16()),
                        ..GatewayResponse::default()
                    },
                    Ok(text) => parse_body(&text, http_status.as_u16()),
                    Err(e) => GatewayResponse::transport_failure(e.to_string()),
                }
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(path, "gateway call timed out");
                GatewayResponse::transport_failure("gateway timeout")
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "gateway call failed");
                GatewayResponse::transport_failure(e.to_string())
            }
        };

        tracing::debug!(
            method = method.as_str(),
            path,
            status = ?response.status,
            "gateway call completed"
        );

        GatewayExchange {
            request: request_body,
            response,
        }
    }
}

/// Parses a gateway body, dropping the `additionalData` block the gateway
/// echoes back. A body that is not JSON becomes a transport failure.
fn parse_body(text: &str, http_status: u16) -> GatewayResponse {
    let mut value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            let snippet: String = text.chars().take(200).collect();
            return GatewayResponse::transport_failure(format!(
                "Unable to receive non-JSON format response from Powerboard API : {snippet}"
            ));
        }
    };
    if let Some(obj) = value.as_object_mut() {
        obj.remove("additionalData");
        if !obj.contains_key("status") {
            obj.insert("status".to_string(), Value::from(http_status));
        }
    }
    serde_json::from_value(value).unwrap_or_else(|e| GatewayResponse::transport_failure(e.to_string()))
}
