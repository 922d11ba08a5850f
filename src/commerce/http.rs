use crate::commerce::{CommercePlatform, CustomObject, Customer, Order};
use crate::config::AppConfig;
use crate::domain::payment::{Payment, UpdateAction};
use crate::error::CommerceError;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Tokens are refreshed this long before the platform says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct PagedResults<T> {
    results: Vec<T>,
}

/// REST client for the commerce platform, authenticated with the
/// client-credentials grant.
#[derive(Clone)]
pub struct CommercetoolsClient {
    client: reqwest::Client,
    api_base: String,
    auth_url: String,
    client_id: String,
    client_secret: String,
    token: Arc<RwLock<Option<(Instant, String)>>>,
}

impl CommercetoolsClient {
    pub fn new(client: reqwest::Client, config: &AppConfig) -> Self {
        Self {
            client,
            api_base: format!(
                "{}/{}",
                config.ctp_api_url.trim_end_matches('/'),
                config.ctp_project_key
            ),
            auth_url: config.ctp_auth_url.trim_end_matches('/').to_string(),
            client_id: config.ctp_client_id.clone(),
            client_secret: config.ctp_client_secret.clone(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    async fn access_token(&self) -> Result<String, CommerceError> {
        {
            let read = self.token.read().await;
            if let Some((expires_at, token)) = &*read {
                if Instant::now() < *expires_at {
                    return Ok(token.clone());
                }
            }
        }

        let resp = self
            .client
            .post(format!("{}/oauth/token", self.auth_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CommerceError::Api {
                status: status.as_u16(),
                message: format!("token request rejected: {}", body.chars().take(200).collect::<String>()),
            });
        }
        let token: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);

        let mut write = self.token.write().await;
        *write = Some((Instant::now() + lifetime, token.access_token.clone()));
        Ok(token.access_token)
    }

    /// Sends one request. `Ok(None)` means the platform answered 404.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, CommerceError> {
        let token = self.access_token().await?;
        let mut req = self
            .client
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            let value = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text)?
            };
            return Ok(Some(value));
        }
        Err(error_from_body(status, &text))
    }

    async fn get_typed<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, CommerceError> {
        match self.send(Method::GET, path, &[], None).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn update_typed<T: DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<T, CommerceError> {
        let body = json!({ "version": version, "actions": actions });
        let value = self
            .send(Method::POST, path, &[], Some(&body))
            .await?
            .ok_or_else(|| CommerceError::NotFound(what.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }
}

fn error_from_body(status: StatusCode, text: &str) -> CommerceError {
    let parsed: Value = serde_json::from_str(text).unwrap_or(Value::Null);
    if status == StatusCode::CONFLICT {
        let current_version = parsed
            .pointer("/errors/0/currentVersion")
            .and_then(Value::as_i64);
        return CommerceError::ConcurrentModification { current_version };
    }
    let message = parsed
        .get("message")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .unwrap_or_else(|| text.chars().take(200).collect());
    CommerceError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait::async_trait]
impl CommercePlatform for CommercetoolsClient {
    async fn get_payment(&self, id: &str) -> Result<Option<Payment>, CommerceError> {
        self.get_typed(&format!("/payments/{id}")).await
    }

    async fn get_payment_by_key(&self, key: &str) -> Result<Option<Payment>, CommerceError> {
        self.get_typed(&format!("/payments/key={key}")).await
    }

    async fn update_payment(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Payment, CommerceError> {
        self.update_typed(&format!("/payments/{id}"), &format!("payment {id}"), version, actions)
            .await
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>, CommerceError> {
        self.get_typed(&format!("/orders/{id}")).await
    }

    async fn find_order_by_payment(&self, payment_id: &str) -> Result<Option<Order>, CommerceError> {
        let predicate = format!("paymentInfo(payments(id=\"{payment_id}\"))");
        let query = [("where", predicate.as_str()), ("limit", "1")];
        let Some(value) = self.send(Method::GET, "/orders", &query, None).await? else {
            return Ok(None);
        };
        let page: PagedResults<Order> = serde_json::from_value(value)?;
        Ok(page.results.into_iter().next())
    }

    async fn update_order(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Order, CommerceError> {
        self.update_typed(&format!("/orders/{id}"), &format!("order {id}"), version, actions)
            .await
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>, CommerceError> {
        self.get_typed(&format!("/customers/{id}")).await
    }

    async fn update_customer(
        &self,
        id: &str,
        version: i64,
        actions: &[UpdateAction],
    ) -> Result<Customer, CommerceError> {
        self.update_typed(&format!("/customers/{id}"), &format!("customer {id}"), version, actions)
            .await
    }

    async fn get_custom_object(&self, container: &str, key: &str) -> Result<Option<CustomObject>, CommerceError> {
        self.get_typed(&format!("/custom-objects/{container}/{key}")).await
    }

    async fn list_custom_objects(&self, container: &str) -> Result<Vec<CustomObject>, CommerceError> {
        let query = [("limit", "500"), ("sort", "key asc")];
        let path = format!("/custom-objects/{container}");
        let Some(value) = self.send(Method::GET, &path, &query, None).await? else {
            return Ok(Vec::new());
        };
        let page: PagedResults<CustomObject> = serde_json::from_value(value)?;
        Ok(page.results)
    }

    async fn upsert_custom_object(&self, container: &str, key: &str, value: Value) -> Result<CustomObject, CommerceError> {
        let body = json!({ "container": container, "key": key, "value": value });
        let created = self
            .send(Method::POST, "/custom-objects", &[], Some(&body))
            .await?
            .ok_or_else(|| CommerceError::NotFound(format!("custom object {container}/{key}")))?;
        Ok(serde_json::from_value(created)?)
    }

    async fn delete_custom_object(&self, container: &str, key: &str) -> Result<bool, CommerceError> {
        let path = format!("/custom-objects/{container}/{key}");
        Ok(self.send(Method::DELETE, &path, &[], None).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_carries_current_version() {
        let err = error_from_body(
            StatusCode::CONFLICT,
            r#"{"statusCode":409,"errors":[{"code":"ConcurrentModification","currentVersion":7}]}"#,
        );
        assert!(matches!(err, CommerceError::ConcurrentModification { current_version: Some(7) }));
    }

    #[test]
    fn api_error_prefers_platform_message() {
        let err = error_from_body(
            StatusCode::BAD_REQUEST,
            r#"{"statusCode":400,"message":"Invalid key"}"#,
        );
        assert!(matches!(err, CommerceError::Api { status: 400, ref message } if message == "Invalid key"));
    }

    #[test]
    fn non_json_error_body_is_truncated_text() {
        let err = error_from_body(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, CommerceError::Api { status: 502, ref message } if message == "upstream down"));
    }
}
