//! Integration test: a worker that never finishes is killed at the deadline.
//!
//! Uses `/bin/sh` as a stand-in worker so the test does not depend on the
//! real worker binary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gradebox_core::SandboxLimits;
use gradebox_executor::{Evaluator, EvaluatorConfig, ExecutorError, ProcessBackend, SubmissionRunner, WorkerBackend};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

fn spinning_worker(deadline: Duration) -> EvaluatorConfig {
    let limits = match SandboxLimits::new(Duration::from_secs(1), 64 * 1024 * 1024, deadline) {
        Ok(l) => l,
        Err(e) => panic!("test limits rejected: {e}"),
    };
    EvaluatorConfig::new("/bin/sh", "keys.json")
        .with_args(["-c", "while :; do :; done"])
        .with_limits(limits)
}

#[tokio::test]
async fn overdue_worker_is_killed_and_reaped() {
    let config = spinning_worker(Duration::from_millis(1500));
    let backend = Arc::new(ProcessBackend::new());
    let runner = SubmissionRunner::new(Arc::clone(&backend));

    let handle = match backend.spawn(&config).await {
        Ok(h) => h,
        Err(e) => panic!("spawn failed: {e}"),
    };
    let Some(pid) = handle.pid.and_then(|p| i32::try_from(p).ok()) else {
        panic!("spawned worker has no pid");
    };

    let started = Instant::now();
    let result = runner.collect(handle, br#"{"unit_name":"unit1","code":""}"#, config.limits.deadline).await;
    let elapsed = started.elapsed();

    assert!(
        matches!(result, Err(ExecutorError::DeadlineExceeded { deadline_ms: 1500, .. })),
        "expected DeadlineExceeded, got {result:?}"
    );
    assert!(elapsed >= Duration::from_millis(1500), "returned before the deadline: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "kill took too long: {elapsed:?}");
    assert_eq!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH), "worker {pid} must be gone");
}

#[tokio::test]
async fn evaluator_reports_timeout_and_leaves_no_workers() {
    let evaluator = Evaluator::new(ProcessBackend::new(), spinning_worker(Duration::from_millis(1200)));

    let verdict = evaluator.evaluate("unit1", "while True:\n    pass\n").await;

    assert_eq!(verdict.message(), "Your code took too long to run.");
    assert!(!verdict.success());
    assert_eq!(evaluator.active_count(), 0, "no worker may outlive evaluate");
}

#[tokio::test]
async fn concurrent_timeouts_are_independent() {
    let evaluator = Arc::new(Evaluator::new(ProcessBackend::new(), spinning_worker(Duration::from_millis(1200))));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let evaluator = Arc::clone(&evaluator);
            tokio::spawn(async move { evaluator.evaluate("unit1", "").await })
        })
        .collect();

    for task in tasks {
        match task.await {
            Ok(verdict) => assert_eq!(verdict.message(), "Your code took too long to run."),
            Err(e) => panic!("evaluation task panicked: {e}"),
        }
    }
    assert_eq!(evaluator.active_count(), 0);
}

#[tokio::test]
async fn missing_worker_binary_is_execution_failure() {
    let config = EvaluatorConfig::new("/nonexistent/gradebox-worker", "keys.json");
    let evaluator = Evaluator::new(ProcessBackend::new(), config);

    assert!(matches!(evaluator.health_check().await, Err(ExecutorError::WorkerNotFound { .. })));
    assert_eq!(evaluator.evaluate("unit1", "").await.message(), "Code execution failed.");
}
