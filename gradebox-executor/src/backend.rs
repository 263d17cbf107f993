//! Worker backend abstraction trait.
//!
//! Lets the evaluator drive workers without knowing how they are started,
//! so tests can substitute a backend that never forks.

use async_trait::async_trait;

use crate::{EvaluatorConfig, ExecutorError, WorkerHandle};

/// Starts and stops sandbox workers.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    /// Spawn one fresh worker with piped stdio.
    ///
    /// # Errors
    /// Returns [`ExecutorError::WorkerNotFound`] if the worker program is missing.
    /// Returns [`ExecutorError::SpawnFailed`] if the process cannot be started.
    async fn spawn(&self, config: &EvaluatorConfig) -> Result<WorkerHandle, ExecutorError>;

    /// Kill the worker and everything in its process group, then reap it.
    ///
    /// Safe to call on a worker that has already exited.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Io`] if the child cannot be reaped.
    async fn terminate(&self, handle: &mut WorkerHandle) -> Result<(), ExecutorError>;

    /// Check that workers can be started with the given configuration.
    ///
    /// # Errors
    /// Returns [`ExecutorError::WorkerNotFound`] or [`ExecutorError::Config`]
    /// if the environment is not ready.
    async fn health_check(&self, config: &EvaluatorConfig) -> Result<(), ExecutorError>;
}
