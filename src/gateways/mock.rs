use crate::domain::merchant_config::GatewayConnection;
use crate::gateways::{GatewayClient, GatewayExchange, GatewayResponse, HttpMethod};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

struct Script {
    method: HttpMethod,
    path_prefix: String,
    responses: VecDeque<GatewayResponse>,
}

/// In-process gateway. Scripted responses are consumed in order per
/// `(method, path prefix)`; anything unscripted gets a plausible success.
#[derive(Default)]
pub struct MockGateway {
    scripts: Mutex<Vec<Script>>,
    calls: Mutex<Vec<RecordedCall>>,
    counter: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: HttpMethod, path_prefix: &str, response: GatewayResponse) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(script) = scripts
            .iter_mut()
            .find(|s| s.method == method && s.path_prefix == path_prefix)
        {
            script.responses.push_back(response);
            return;
        }
        scripts.push(Script {
            method,
            path_prefix: path_prefix.to_string(),
            responses: VecDeque::from([response]),
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn calls_to(&self, path_prefix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path.starts_with(path_prefix))
            .collect()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn scripted(&self, method: HttpMethod, path: &str) -> Option<GatewayResponse> {
        let mut scripts = self.scripts.lock().unwrap_or_else(|p| p.into_inner());
        scripts
            .iter_mut()
            .filter(|s| s.method == method && path.starts_with(&s.path_prefix))
            .max_by_key(|s| s.path_prefix.len())
            .and_then(|s| s.responses.pop_front())
    }

    fn default_response(&self, path: &str) -> GatewayResponse {
        if path.starts_with("/v1/vault/payment_sources") {
            return GatewayResponse::created(json!({
                "vault_token": self.next_id("vt_mock"),
                "type": "card",
            }));
        }
        if let Some(rest) = path.strip_prefix("/v1/vault-tokens/") {
            return GatewayResponse::created(json!({
                "vault_token": rest.trim_end_matches('/'),
                "type": "card",
                "card_number_bin": "411111",
                "card_number_last4": "1111",
                "card_scheme": "visa",
                "expire_month": 12,
                "expire_year": 2030,
            }));
        }
        if path.starts_with("/v1/customers") {
            return GatewayResponse::created(json!({ "_id": self.next_id("cus_mock") }));
        }
        if path.starts_with("/v1/charges/standalone-3ds") {
            return GatewayResponse::created(json!({
                "_id": self.next_id("ch3ds_mock"),
                "_3ds": { "token": self.next_id("3ds_token") },
            }));
        }
        if path.starts_with("/v1/charges/wallet") {
            return GatewayResponse::created(json!({
                "token": self.next_id("wallet_token"),
                "charge": { "_id": self.next_id("ch_mock") },
            }));
        }
        GatewayResponse::created(json!({
            "_id": self.next_id("ch_mock"),
            "status": "complete",
            "authorization": false,
        }))
    }
}

#[async_trait::async_trait]
impl GatewayClient for MockGateway {
    async fn call(
        &self,
        _connection: &GatewayConnection,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> GatewayExchange {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RecordedCall {
                method,
                path: path.to_string(),
                body: body.cloned(),
            });
        let response = self
            .scripted(method, path)
            .unwrap_or_else(|| self.default_response(path));
        GatewayExchange {
            request: body.cloned().unwrap_or(Value::Null),
            response,
        }
    }
}
