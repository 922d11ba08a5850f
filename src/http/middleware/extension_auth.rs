use crate::service::dispatcher::ExtensionErrors;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Platform API client credentials the extension must be called with.
#[derive(Clone)]
pub struct ExtensionCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ExtensionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ExtensionCredentials {
    /// `Authorization: Basic base64(client_id:client_secret)`, compared exactly.
    pub fn accepts(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers.get("authorization").and_then(|h| h.to_str().ok()) else {
            return false;
        };
        let Some((_, encoded)) = value.split_once(' ') else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((id, secret)) => id == self.client_id && secret == self.client_secret,
            None => false,
        }
    }

    pub fn header_value(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret)))
    }
}

fn rejected(code: &'static str, message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ExtensionErrors::single(code, message))).into_response()
}

pub async fn require_extension_auth(
    State(credentials): State<ExtensionCredentials>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        tracing::debug!(method = %request.method(), "non-POST extension request");
        return rejected("InvalidInput", "Invalid HTTP method");
    }
    if !credentials.accepts(request.headers()) {
        tracing::warn!("extension request with invalid authorization");
        return rejected("Unauthorized", "Unauthorized request");
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn credentials() -> ExtensionCredentials {
        ExtensionCredentials {
            client_id: "client".to_string(),
            client_secret: "s3cr:et".to_string(),
        }
    }

    #[test]
    fn accepts_own_header() {
        let creds = credentials();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(&creds.header_value()).unwrap());
        assert!(creds.accepts(&headers));
    }

    #[test]
    fn rejects_missing_or_wrong_header() {
        let creds = credentials();
        assert!(!creds.accepts(&HeaderMap::new()));
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic Y2xpZW50Om5vcGU="));
        assert!(!creds.accepts(&headers));
    }
}
