use crate::domain::payment::Payment;
use crate::error::ConnectorError;
use crate::service::dispatcher::{ExtensionErrors, ExtensionResponse};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct ExtensionInput {
    pub resource: ExtensionResource,
}

#[derive(Debug, Deserialize)]
pub struct ExtensionResource {
    pub obj: Payment,
}

fn payment_id_hint(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/resource/obj/id").and_then(Value::as_str).map(ToString::to_string))
        .unwrap_or_else(|| "undefined".to_string())
}

fn error_response(payment_id: &str, error: &ConnectorError) -> axum::response::Response {
    let body = match error {
        ConnectorError::Validation { code, message } => ExtensionErrors::single(*code, message.clone()),
        other => ExtensionErrors::unexpected(payment_id, other),
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

pub async fn handle_extension(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let input: ExtensionInput = match serde_json::from_slice(&body) {
        Ok(input) => input,
        Err(e) => {
            tracing::error!(error = %e, "unreadable extension request");
            let error = ConnectorError::invalid_input(format!("Error during parsing CTP request: {e}"));
            return error_response(&payment_id_hint(&body), &error);
        }
    };
    let payment = input.resource.obj;

    match state.dispatcher.dispatch(&payment).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) => (StatusCode::OK, Json(ExtensionResponse::default())).into_response(),
        Err(e) => {
            tracing::error!(payment_id = %payment.id, error = %e, "extension request failed");
            error_response(&payment.id, &e)
        }
    }
}
