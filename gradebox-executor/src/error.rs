//! Error types for the executor crate.

use std::path::PathBuf;

use gradebox_core::CoreError;
use uuid::Uuid;

/// Errors that can occur while driving a sandbox worker.
///
/// None of these reach the caller of [`crate::Evaluator::evaluate`]; they are
/// folded into error verdicts there.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The worker executable does not exist at the configured path.
    #[error("worker binary not found at {path}")]
    WorkerNotFound { path: PathBuf },

    /// The worker process could not be started.
    #[error("worker spawn failed: {0}")]
    SpawnFailed(String),

    /// The worker did not finish before its wall-clock deadline.
    #[error("worker {worker_id} did not finish within {deadline_ms}ms")]
    DeadlineExceeded { worker_id: Uuid, deadline_ms: u128 },

    /// Evaluator settings were rejected.
    #[error("invalid evaluator configuration: {0}")]
    Config(#[from] CoreError),

    /// The request payload could not be encoded.
    #[error("request encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Underlying I/O error while talking to the worker.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
