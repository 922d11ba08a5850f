use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

/// Ready once the merchant configuration can be read from the platform.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.dispatcher.config.merchant_config().await;
    let ok = config.is_ok();
    if let Err(e) = &config {
        tracing::warn!(error = %e, "readiness check failed");
    }

    let status = if ok {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": ok,
            "merchant_config": ok,
            "sandbox_mode": config.map(|c| c.sandbox_mode()).unwrap_or(false)
        })),
    )
        .into_response()
}

pub async fn liveness() -> impl IntoResponse {
    (axum::http::StatusCode::OK, Json(serde_json::json!({"alive": true}))).into_response()
}
