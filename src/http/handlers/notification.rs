use crate::domain::notification::NotificationPayload;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Always answers 200: the gateway redelivers anything else. Outcomes are
/// only visible in the logs and the audit trail.
pub async fn handle_notification(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    match serde_json::from_slice::<NotificationPayload>(&body) {
        Ok(payload) => {
            let outcome = state.reconciler.process(&payload).await;
            tracing::info!(
                event = payload.event.as_deref().unwrap_or_default(),
                reference = payload.notification.reference().unwrap_or_default(),
                status = outcome.status.as_str(),
                message = %outcome.message,
                "notification processed"
            );
        }
        Err(e) => tracing::warn!(error = %e, "unreadable notification body"),
    }
    (StatusCode::OK, Json(json!({ "notificationResponse": "[accepted]" }))).into_response()
}
