//! API error types and their HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use livepoll_admission::AdmissionError;

/// Process-level server failures (bind, config).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// An admission failure crossing the HTTP boundary.
///
/// Policy verdicts (duplicate, expired, rate limited) are not errors; they
/// travel through `VoteOutcome` and are mapped in the handler. This type
/// only carries the terminal failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub AdmissionError);

impl From<livepoll_store::StoreError> for ApiError {
    fn from(e: livepoll_store::StoreError) -> Self {
        ApiError(AdmissionError::Store(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self.0 {
            AdmissionError::InvalidPayload(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AdmissionError::PollNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("poll not found: {id}"))
            }
            AdmissionError::StoreUnavailable(msg) => {
                warn!("admission store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service temporarily unavailable, please try again".to_string(),
                )
            }
            AdmissionError::Store(e) => {
                error!("storage failure in request handling: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        let body = Json(serde_json::json!({ "status": "error", "reason": reason }));
        (status, body).into_response()
    }
}
