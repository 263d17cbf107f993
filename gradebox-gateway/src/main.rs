//! Entry point for the `gradebox-gateway` HTTP server.

use std::sync::Arc;

use gradebox_executor::{Evaluator, EvaluatorConfig, ProcessBackend};
use gradebox_gateway::{routes::create_router, DEFAULT_LISTEN_ADDR, ENV_LISTEN_ADDR};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let addr = std::env::var(ENV_LISTEN_ADDR).unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_owned());

    let config = match EvaluatorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid evaluator configuration");
            std::process::exit(1);
        }
    };
    info!(
        worker = %config.worker_program.display(),
        answer_keys = %config.answer_key_path.display(),
        cpu_seconds = config.limits.cpu_seconds(),
        memory_bytes = config.limits.memory_bytes,
        deadline_ms = config.limits.deadline.as_millis(),
        "evaluator configured"
    );

    let evaluator = Arc::new(Evaluator::new(ProcessBackend::new(), config));
    if let Err(e) = evaluator.health_check().await {
        tracing::warn!(error = %e, "workers cannot be started yet; submissions will fail until this is fixed");
    }
    let app = create_router(evaluator);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "gradebox-gateway listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
