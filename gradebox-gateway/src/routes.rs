//! Axum route handlers for the gradebox gateway API.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use gradebox_core::ExerciseId;
use gradebox_executor::{Evaluator, WorkerBackend};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::GatewayError;

/// Largest submission accepted, in bytes of source: 64 KiB.
pub const MAX_CODE_BYTES: usize = 64 * 1024;

// ── Request types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmissionBody {
    pub code: String,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the application router around a shared evaluator.
pub fn create_router<B: WorkerBackend + 'static>(evaluator: Arc<Evaluator<B>>) -> Router {
    Router::new()
        .route("/v1/exercises/{exercise_id}/submissions", post(submit::<B>))
        .route("/health", get(health))
        .route("/ready", get(ready::<B>))
        .with_state(evaluator)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /health` — liveness probe.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// `GET /ready` — readiness probe: can a worker be started right now?
///
/// # Errors
/// Returns [`GatewayError::Unavailable`] if the evaluator's health check fails.
pub async fn ready<B: WorkerBackend + 'static>(
    State(evaluator): State<Arc<Evaluator<B>>>,
) -> Result<impl IntoResponse, GatewayError> {
    evaluator.health_check().await?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}

/// `POST /v1/exercises/{exercise_id}/submissions` — grade one submission.
///
/// Responds 200 with the verdict payload whatever the code did; only a
/// malformed request is rejected.
///
/// # Errors
/// Returns [`GatewayError::InvalidExerciseId`] for a malformed id, or
/// [`GatewayError::CodeTooLarge`] if the code exceeds [`MAX_CODE_BYTES`].
pub async fn submit<B: WorkerBackend + 'static>(
    State(evaluator): State<Arc<Evaluator<B>>>,
    Path(exercise_id): Path<String>,
    Json(body): Json<SubmissionBody>,
) -> Result<impl IntoResponse, GatewayError> {
    let exercise_id = ExerciseId::parse(exercise_id)?;
    if body.code.len() > MAX_CODE_BYTES {
        return Err(GatewayError::CodeTooLarge { size: body.code.len(), limit: MAX_CODE_BYTES });
    }

    let verdict = evaluator.evaluate(exercise_id.as_str(), &body.code).await;
    Ok(Json(verdict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use gradebox_executor::{EvaluatorConfig, ProcessBackend};
    use tower::ServiceExt;

    /// An evaluator whose "worker" is a shell script printing `verdict`.
    fn scripted_app(verdict: &str) -> Router {
        let script = format!("printf '%s\\n' '{verdict}'");
        let config = EvaluatorConfig::new("/bin/sh", "keys.json").with_args(["-c".to_owned(), script]);
        create_router(Arc::new(Evaluator::new(ProcessBackend::new(), config)))
    }

    fn missing_worker_app() -> Router {
        let config = EvaluatorConfig::new("/nonexistent/gradebox-worker", "keys.json");
        create_router(Arc::new(Evaluator::new(ProcessBackend::new(), config)))
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = match app.oneshot(req).await {
            Ok(r) => r,
            Err(e) => panic!("handler error: {e}"),
        };
        let status = resp.status();
        let bytes = match axum::body::to_bytes(resp.into_body(), 1 << 20).await {
            Ok(b) => b,
            Err(e) => panic!("failed to read body: {e}"),
        };
        match serde_json::from_slice(&bytes) {
            Ok(v) => (status, v),
            Err(e) => panic!("invalid JSON ({status}): {e}"),
        }
    }

    fn submission(exercise_id: &str, code: &str) -> Request<Body> {
        let body = serde_json::json!({ "code": code }).to_string();
        match Request::builder()
            .method("POST")
            .uri(format!("/v1/exercises/{exercise_id}/submissions"))
            .header("content-type", "application/json")
            .body(Body::from(body))
        {
            Ok(r) => r,
            Err(e) => panic!("failed to build request: {e}"),
        }
    }

    #[tokio::test]
    async fn health_response_format_returns_ok_with_status_field() {
        let req = match Request::builder().uri("/health").body(Body::empty()) {
            Ok(r) => r,
            Err(e) => panic!("failed to build request: {e}"),
        };
        let (status, body) = call(missing_worker_app(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn ready_reports_missing_worker_as_unavailable() {
        let req = match Request::builder().uri("/ready").body(Body::empty()) {
            Ok(r) => r,
            Err(e) => panic!("failed to build request: {e}"),
        };
        let (status, body) = call(missing_worker_app(), req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().is_some_and(|m| m.contains("not found")), "got {body}");
    }

    #[tokio::test]
    async fn submission_returns_worker_verdict() {
        let app = scripted_app(r#"{"success": true, "score": 10, "message": "All correct!"}"#);
        let (status, body) = call(app, submission("unit1", "submit_answers('a', 2, True)")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"success": true, "score": 10, "message": "All correct!"}));
    }

    #[tokio::test]
    async fn failed_evaluation_is_still_a_200_verdict() {
        let (status, body) = call(missing_worker_app(), submission("unit1", "pass")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"error": "Code execution failed."}));
    }

    #[tokio::test]
    async fn malformed_exercise_id_is_rejected() {
        let (status, body) = call(missing_worker_app(), submission("unit%201", "pass")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|m| m.contains("invalid exercise id")), "got {body}");
    }

    #[tokio::test]
    async fn oversized_code_is_rejected_before_evaluation() {
        let code = "x = 1\n".repeat(MAX_CODE_BYTES / 6 + 1);
        let (status, body) = call(missing_worker_app(), submission("unit1", &code)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|m| m.contains("limit")), "got {body}");
    }
}
