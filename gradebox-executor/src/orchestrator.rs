//! Evaluation orchestrator wrapping a [`WorkerBackend`].
//!
//! One call to [`Evaluator::evaluate`] spawns one fresh worker, feeds it the
//! submission, enforces the wall-clock deadline and turns whatever happened
//! into exactly one [`VerdictRecord`].

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use gradebox_core::{ContentHash, SubmissionRequest, VerdictRecord};
use uuid::Uuid;

use crate::{EvaluatorConfig, ExecutorError, ProcessBackend, SubmissionRunner, WorkerBackend};

type Registry = Arc<Mutex<BTreeSet<Uuid>>>;

/// Host-side evaluator: never runs submitted code itself.
///
/// Keeps a registry of live workers; a worker is listed from spawn until it
/// has been reaped. All operations are safe to call concurrently.
pub struct Evaluator<B: WorkerBackend> {
    backend: Arc<B>,
    runner: SubmissionRunner<B>,
    config: EvaluatorConfig,
    active_workers: Registry,
}

impl<B: WorkerBackend> Evaluator<B> {
    /// Create an evaluator that starts workers through `backend`.
    #[must_use]
    pub fn new(backend: B, config: EvaluatorConfig) -> Self {
        let backend = Arc::new(backend);
        Self {
            runner: SubmissionRunner::new(Arc::clone(&backend)),
            backend,
            config,
            active_workers: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// The configuration workers are started with.
    #[must_use]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Grade `source_code` against `exercise_id` in a fresh worker.
    ///
    /// Every failure is reported as an error verdict:
    ///
    /// | Cause | Message |
    /// |---|---|
    /// | deadline or CPU ceiling hit | `Your code took too long to run.` |
    /// | spawn failure, non-zero exit, I/O failure | `Code execution failed.` |
    /// | clean exit, unparseable output | `Invalid response from code runner.` |
    ///
    /// # Cancel Safety
    /// Dropping the future kills the worker and removes it from the registry.
    pub async fn evaluate(&self, exercise_id: &str, source_code: &str) -> VerdictRecord {
        let started = Instant::now();
        let source_hash = ContentHash::of(source_code.as_bytes());

        let verdict = match self.run_worker(exercise_id, source_code).await {
            Ok(verdict) => verdict,
            Err(ExecutorError::DeadlineExceeded { .. }) => VerdictRecord::timeout(),
            Err(e) => {
                tracing::warn!(exercise_id, source_hash = %source_hash, error = %e, "evaluation failed");
                VerdictRecord::execution_failed()
            }
        };

        tracing::info!(
            exercise_id,
            source_hash = %source_hash,
            success = verdict.success(),
            score = verdict.score(),
            elapsed_ms = started.elapsed().as_millis(),
            "submission evaluated"
        );

        verdict
    }

    /// Blocking form of [`Evaluator::evaluate`] for synchronous callers.
    ///
    /// Drives the evaluation on a private current-thread runtime, so it must
    /// not be called from inside an async context.
    #[must_use]
    pub fn evaluate_blocking(&self, exercise_id: &str, source_code: &str) -> VerdictRecord {
        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(self.evaluate(exercise_id, source_code)),
            Err(e) => {
                tracing::error!(error = %e, "cannot start runtime for blocking evaluation");
                VerdictRecord::execution_failed()
            }
        }
    }

    /// Check that a worker could be started right now.
    ///
    /// # Errors
    /// Propagates errors from the underlying [`WorkerBackend::health_check`].
    pub async fn health_check(&self) -> Result<(), ExecutorError> {
        self.backend.health_check(&self.config).await
    }

    /// Return the number of workers that are spawned but not yet reaped.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_workers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn run_worker(&self, exercise_id: &str, source_code: &str) -> Result<VerdictRecord, ExecutorError> {
        let payload = SubmissionRequest::new(exercise_id, source_code).to_payload()?;
        let handle = self.backend.spawn(&self.config).await?;
        let worker_id = handle.id;
        let _registration = Registration::new(&self.active_workers, worker_id);

        tracing::debug!(exercise_id, worker_id = %worker_id, "worker started");

        let output = self.runner.collect(handle, payload.as_bytes(), self.config.limits.deadline).await?;
        let verdict = output.verdict();
        if !output.status.success() {
            tracing::warn!(exercise_id, worker_id = %worker_id, status = %output.status, "worker exited abnormally");
        }

        Ok(verdict)
    }
}

/// Registry entry that removes itself when dropped.
struct Registration {
    registry: Registry,
    worker_id: Uuid,
}

impl Registration {
    fn new(registry: &Registry, worker_id: Uuid) -> Self {
        registry.lock().unwrap_or_else(PoisonError::into_inner).insert(worker_id);
        Self { registry: Arc::clone(registry), worker_id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.worker_id);
    }
}

/// Grade one submission with the environment's configuration.
///
/// This is the synchronous entry point for the surrounding application. It
/// never fails: configuration problems become an error verdict.
#[must_use]
pub fn evaluate_submission(exercise_id: &str, source_code: &str) -> VerdictRecord {
    match EvaluatorConfig::from_env() {
        Ok(config) => Evaluator::new(ProcessBackend::new(), config).evaluate_blocking(exercise_id, source_code),
        Err(e) => {
            tracing::error!(error = %e, "evaluator configuration rejected");
            VerdictRecord::execution_failed()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use gradebox_core::verdict::{EXECUTION_FAILED_MESSAGE, TIMEOUT_MESSAGE};

    use super::*;
    use crate::WorkerHandle;

    struct AlwaysFailBackend {
        spawns: AtomicUsize,
    }

    #[async_trait]
    impl WorkerBackend for AlwaysFailBackend {
        async fn spawn(&self, _config: &EvaluatorConfig) -> Result<WorkerHandle, ExecutorError> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            Err(ExecutorError::SpawnFailed("mock always fails".to_owned()))
        }

        async fn terminate(&self, _handle: &mut WorkerHandle) -> Result<(), ExecutorError> {
            Ok(())
        }

        async fn health_check(&self, _config: &EvaluatorConfig) -> Result<(), ExecutorError> {
            Err(ExecutorError::WorkerNotFound { path: "mock".into() })
        }
    }

    /// Spawns `/bin/sh -c <script>` regardless of the configured program.
    struct ScriptBackend {
        script: &'static str,
    }

    #[async_trait]
    impl WorkerBackend for ScriptBackend {
        async fn spawn(&self, config: &EvaluatorConfig) -> Result<WorkerHandle, ExecutorError> {
            let scripted = EvaluatorConfig::new("/bin/sh", config.answer_key_path.clone())
                .with_args(["-c", self.script])
                .with_limits(config.limits);
            ProcessBackend::new().spawn(&scripted).await
        }

        async fn terminate(&self, handle: &mut WorkerHandle) -> Result<(), ExecutorError> {
            ProcessBackend::new().terminate(handle).await
        }

        async fn health_check(&self, _config: &EvaluatorConfig) -> Result<(), ExecutorError> {
            Ok(())
        }
    }

    fn config() -> EvaluatorConfig {
        EvaluatorConfig::new("/unused", "keys.json")
    }

    #[tokio::test]
    async fn evaluator_active_count_starts_at_zero() {
        let evaluator = Evaluator::new(AlwaysFailBackend { spawns: AtomicUsize::new(0) }, config());
        assert_eq!(evaluator.active_count(), 0, "new evaluator must have zero active workers");
    }

    #[tokio::test]
    async fn spawn_failure_becomes_execution_failed_verdict() {
        let evaluator = Evaluator::new(AlwaysFailBackend { spawns: AtomicUsize::new(0) }, config());
        let verdict = evaluator.evaluate("unit1", "submit_answers('a', 2, True)").await;
        assert_eq!(verdict.message(), EXECUTION_FAILED_MESSAGE);
        assert_eq!(evaluator.active_count(), 0);
    }

    #[tokio::test]
    async fn every_evaluation_spawns_a_fresh_worker() {
        let evaluator = Evaluator::new(AlwaysFailBackend { spawns: AtomicUsize::new(0) }, config());
        for _ in 0..3 {
            let _ = evaluator.evaluate("unit1", "").await;
        }
        assert_eq!(evaluator.backend.spawns.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn health_check_propagates_backend_error() {
        let evaluator = Evaluator::new(AlwaysFailBackend { spawns: AtomicUsize::new(0) }, config());
        assert!(matches!(evaluator.health_check().await, Err(ExecutorError::WorkerNotFound { .. })));
    }

    #[tokio::test]
    async fn worker_verdict_is_returned_verbatim() {
        let backend = ScriptBackend {
            script: r#"printf '%s\n' '{"success": false, "score": 0, "got": ["a", 3, true], "expected": ["a", 2, true], "message": "x"}'"#,
        };
        let evaluator = Evaluator::new(backend, config());
        let verdict = evaluator.evaluate("unit1", "submit_answers('a', 3, True)").await;
        assert!(!verdict.success());
        assert_eq!(verdict.score(), 0);
        assert_eq!(verdict.message(), "Some answers are incorrect");
    }

    #[tokio::test]
    async fn worker_sees_the_request_on_stdin() {
        let backend = ScriptBackend {
            script: r#"read -r line; case "$line" in *'"unit_name":"unit7"'*) printf '{"error": "saw unit7"}';; *) exit 9;; esac"#,
        };
        let evaluator = Evaluator::new(backend, config());
        let verdict = evaluator.evaluate("unit7", "pass").await;
        assert_eq!(verdict, VerdictRecord::error("saw unit7"));
    }

    #[tokio::test]
    async fn cpu_ceiling_signal_becomes_timeout_verdict() {
        let evaluator = Evaluator::new(ScriptBackend { script: "ulimit -c 0; kill -s XCPU $$" }, config());
        let verdict = evaluator.evaluate("unit1", "").await;
        assert_eq!(verdict.message(), TIMEOUT_MESSAGE);
        assert_eq!(evaluator.active_count(), 0);
    }
}
