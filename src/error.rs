use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-level failures of the webhook pipeline.
///
/// Implements `IntoResponse` so handlers can return `Result<_, WebhookError>`
/// and propagate with `?`. Every non-200 here is retryable from the caller's
/// point of view; redelivery of an already-ingested candidate is absorbed by
/// the dedup guard, not by local retries.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Tenant not found")]
    TenantNotFound,

    #[error("Plan limit reached ({plan_used}/{plan_limit})")]
    QuotaExceeded { plan_used: i64, plan_limit: i64 },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unsupported media type")]
    UnsupportedMediaType,

    #[error("Storage error")]
    Store(#[source] anyhow::Error),

    #[error("Failed to insert candidate")]
    WriteFailed(#[source] anyhow::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            WebhookError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Unauthorized" }),
            ),
            WebhookError::TenantNotFound => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Tenant not found" }),
            ),
            WebhookError::QuotaExceeded {
                plan_used,
                plan_limit,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "Plan limit reached",
                    "plan_used": plan_used,
                    "plan_limit": plan_limit,
                }),
            ),
            WebhookError::InvalidPayload(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid payload", "details": details }),
            ),
            WebhookError::UnsupportedMediaType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                json!({ "error": "Unsupported media type" }),
            ),
            WebhookError::Store(e) => {
                error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Storage error", "details": e.to_string() }),
                )
            }
            WebhookError::WriteFailed(e) => {
                error!("Candidate insert failed: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to insert candidate", "details": e.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
