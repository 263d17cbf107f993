//! Error types for the gateway crate.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors that stop a request before it reaches the evaluator.
///
/// Problems with the submitted code itself are not errors here: they come
/// back as verdicts with status 200.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The evaluator cannot start workers.
    #[error("evaluator unavailable: {0}")]
    Unavailable(#[from] gradebox_executor::ExecutorError),

    /// The exercise id in the path is not well formed.
    #[error("{0}")]
    InvalidExerciseId(#[from] gradebox_core::CoreError),

    /// The submission is larger than the gateway accepts.
    #[error("code is {size} bytes, the limit is {limit}")]
    CodeTooLarge { size: usize, limit: usize },
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InvalidExerciseId(_) | GatewayError::CodeTooLarge { .. } => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
