use crate::charge::request_builder::{ChargeEndpoint, ChargeRequest, CustomerRequest};
use crate::domain::merchant_config::GatewayConnection;
use crate::domain::vault::VaultTokenData;
use crate::error::ConnectorError;
use crate::gateways::{GatewayClient, GatewayResponse, HttpMethod};
use serde::Serialize;
use serde_json::{json, Value};

/// Typed gateway operations over a [`GatewayClient`] bound to one connection.
pub struct PowerboardApi<'a> {
    client: &'a dyn GatewayClient,
    connection: GatewayConnection,
}

fn failure(response: &GatewayResponse) -> ConnectorError {
    match response.status {
        None => ConnectorError::Transport(response.error_message()),
        Some(_) => ConnectorError::Gateway(response.error_message()),
    }
}

impl<'a> PowerboardApi<'a> {
    pub fn new(client: &'a dyn GatewayClient, connection: GatewayConnection) -> Self {
        Self { client, connection }
    }

    pub async fn send(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> GatewayResponse {
        self.client
            .call(&self.connection, method, path, body)
            .await
            .response
    }

    async fn send_typed<T: Serialize>(&self, method: HttpMethod, path: &str, body: &T) -> GatewayResponse {
        match serde_json::to_value(body) {
            Ok(value) => self.send(method, path, Some(&value)).await,
            Err(e) => GatewayResponse::transport_failure(e.to_string()),
        }
    }

    pub async fn create_vault_token(&self, data: &Value) -> Result<VaultTokenData, ConnectorError> {
        let response = self.send(HttpMethod::Post, "/v1/vault/payment_sources/", Some(data)).await;
        if !response.is_success() {
            return Err(failure(&response));
        }
        parse_token(&response)
    }

    pub async fn vault_token_data(&self, token: &str) -> Result<VaultTokenData, ConnectorError> {
        let response = self
            .send(HttpMethod::Get, &format!("/v1/vault-tokens/{token}/"), None)
            .await;
        if !response.is_success() {
            return Err(failure(&response));
        }
        parse_token(&response)
    }

    pub async fn create_customer(&self, request: &CustomerRequest) -> Result<String, ConnectorError> {
        let response = self.send_typed(HttpMethod::Post, "/v1/customers", request).await;
        if !response.is_success() {
            return Err(failure(&response));
        }
        response
            .charge_id()
            .map(ToString::to_string)
            .ok_or_else(|| ConnectorError::Gateway("customer response without id".to_string()))
    }

    pub async fn charge(&self, endpoint: &ChargeEndpoint, request: &ChargeRequest) -> GatewayResponse {
        self.send_typed(HttpMethod::Post, &endpoint.path(), request).await
    }

    pub async fn fraud_attach(&self, charge_id: &str, fraud_charge_id: &str) -> GatewayResponse {
        let endpoint = ChargeEndpoint::FraudAttach {
            charge_id: charge_id.to_string(),
        };
        let body = json!({ "fraud_charge_id": fraud_charge_id });
        self.send(HttpMethod::Post, &endpoint.path(), Some(&body)).await
    }

    pub async fn standalone_3ds_token(&self, data: &Value) -> Result<String, ConnectorError> {
        let response = self.send(HttpMethod::Post, "/v1/charges/standalone-3ds", Some(data)).await;
        if !response.is_success() {
            return Err(failure(&response));
        }
        response
            .data_str("/_3ds/token")
            .map(ToString::to_string)
            .ok_or_else(|| ConnectorError::Gateway("3DS response without token".to_string()))
    }

    /// Wallet pre-charge; returns the widget token and the created charge id.
    pub async fn wallet_charge(&self, data: &Value, capture: bool) -> Result<(String, String), ConnectorError> {
        let path = format!("/v1/charges/wallet?capture={capture}");
        let response = self.send(HttpMethod::Post, &path, Some(data)).await;
        if !response.is_success() {
            return Err(failure(&response));
        }
        let token = response.data_str("/token").unwrap_or_default().to_string();
        let charge_id = response.data_str("/charge/_id").unwrap_or_default().to_string();
        Ok((token, charge_id))
    }

    /// Capture, cancel or refund an existing charge.
    pub async fn update_charge(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<String>, ConnectorError> {
        let response = self.send(method, path, body).await;
        if !response.is_success() {
            return Err(failure(&response));
        }
        Ok(response.charge_id().map(ToString::to_string))
    }
}

fn parse_token(response: &GatewayResponse) -> Result<VaultTokenData, ConnectorError> {
    let data = response
        .data()
        .cloned()
        .ok_or_else(|| ConnectorError::Gateway("vault token response without data".to_string()))?;
    serde_json::from_value(data).map_err(|e| ConnectorError::Gateway(format!("unexpected vault token payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::merchant_config::CredentialsType;
    use crate::gateways::mock::MockGateway;

    fn connection() -> GatewayConnection {
        GatewayConnection {
            base_url: "https://gateway.test".to_string(),
            credentials_type: CredentialsType::SecretKey,
            secret: "s".to_string(),
        }
    }

    #[tokio::test]
    async fn vault_token_round_trip_through_mock() {
        let mock = MockGateway::new();
        let api = PowerboardApi::new(&mock, connection());
        let created = api.create_vault_token(&json!({"token": "ott"})).await.unwrap();
        let fetched = api.vault_token_data(&created.vault_token).await.unwrap();
        assert_eq!(fetched.vault_token, created.vault_token);
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn gateway_rejection_surfaces_message() {
        let mock = MockGateway::new();
        mock.respond(
            HttpMethod::Post,
            "/v1/charges/standalone-3ds",
            GatewayResponse::rejected(400, "Invalid card"),
        );
        let api = PowerboardApi::new(&mock, connection());
        let err = api.standalone_3ds_token(&json!({})).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Gateway(ref m) if m == "Invalid card"));
    }

    #[tokio::test]
    async fn wallet_charge_reads_token_and_charge() {
        let mock = MockGateway::new();
        let api = PowerboardApi::new(&mock, connection());
        let (token, charge_id) = api.wallet_charge(&json!({}), false).await.unwrap();
        assert!(token.starts_with("wallet_token"));
        assert!(charge_id.starts_with("ch_mock"));
        assert_eq!(mock.calls()[0].path, "/v1/charges/wallet?capture=false");
    }
}
