//! Process backend: runs each worker as a local child process.
//!
//! Every worker starts with an empty environment (plus the variables from
//! [`EvaluatorConfig::worker_env`]), piped stdio, and its own process group so
//! that a deadline kill reaches anything it managed to start.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use tokio::process::Command;
use uuid::Uuid;

use crate::{EvaluatorConfig, ExecutorError, WorkerBackend, WorkerHandle};

/// Spawns workers with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessBackend;

impl ProcessBackend {
    /// Create the backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkerBackend for ProcessBackend {
    async fn spawn(&self, config: &EvaluatorConfig) -> Result<WorkerHandle, ExecutorError> {
        let program = resolve_program(&config.worker_program)?;
        let worker_id = Uuid::new_v4();

        let process = Command::new(&program)
            .args(&config.worker_args)
            .env_clear()
            .envs(config.worker_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::SpawnFailed(format!("exec {}: {e}", program.display())))?;

        let handle = WorkerHandle::new(worker_id, process);
        tracing::debug!(worker_id = %worker_id, pid = ?handle.pid, "worker spawned");

        Ok(handle)
    }

    async fn terminate(&self, handle: &mut WorkerHandle) -> Result<(), ExecutorError> {
        if let Some(group) = handle.process_group() {
            match killpg(group, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => {
                    tracing::warn!(worker_id = %handle.id, %errno, "killpg failed, killing worker only");
                    handle.process.start_kill()?;
                }
            }
        }

        let status = handle.process.wait().await?;
        tracing::info!(worker_id = %handle.id, %status, "worker terminated");

        Ok(())
    }

    async fn health_check(&self, config: &EvaluatorConfig) -> Result<(), ExecutorError> {
        config.limits.validate()?;
        resolve_program(&config.worker_program)?;
        tokio::fs::metadata(&config.answer_key_path).await?;
        Ok(())
    }
}

/// Find the worker executable, searching `PATH` for bare names.
///
/// Workers run with a cleared environment, so the lookup happens here, in
/// the host's environment.
fn resolve_program(path: &Path) -> Result<PathBuf, ExecutorError> {
    if path.components().count() > 1 || path.is_absolute() {
        if path.is_file() {
            return Ok(path.to_owned());
        }
        return Err(ExecutorError::WorkerNotFound { path: path.to_owned() });
    }

    std::env::var_os("PATH")
        .iter()
        .flat_map(std::env::split_paths)
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ExecutorError::WorkerNotFound { path: path.to_owned() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_program_accepts_existing_absolute_path() {
        let resolved = resolve_program(Path::new("/bin/sh"));
        assert!(matches!(resolved, Ok(p) if p == Path::new("/bin/sh")));
    }

    #[test]
    fn resolve_program_searches_path_for_bare_names() {
        let resolved = resolve_program(Path::new("sh"));
        assert!(matches!(resolved, Ok(p) if p.is_absolute() && p.ends_with("sh")));
    }

    #[test]
    fn resolve_program_reports_missing_worker() {
        for missing in ["/nonexistent/gradebox-worker", "gradebox-worker-that-does-not-exist"] {
            let resolved = resolve_program(Path::new(missing));
            assert!(
                matches!(resolved, Err(ExecutorError::WorkerNotFound { ref path }) if path.as_path() == Path::new(missing)),
                "expected WorkerNotFound for {missing}, got {resolved:?}"
            );
        }
    }

    #[tokio::test]
    async fn health_check_fails_without_answer_keys() {
        let config = EvaluatorConfig::new("/bin/sh", "/nonexistent/keys.json");
        let result = ProcessBackend::new().health_check(&config).await;
        assert!(matches!(result, Err(ExecutorError::Io(_))));
    }

    #[tokio::test]
    async fn terminate_reaps_a_running_worker() {
        let config = EvaluatorConfig::new("/bin/sh", "keys.json").with_args(["-c", "while :; do :; done"]);
        let backend = ProcessBackend::new();
        let mut handle = match backend.spawn(&config).await {
            Ok(h) => h,
            Err(e) => panic!("spawn failed: {e}"),
        };
        assert!(handle.process_group().is_some());

        let result = backend.terminate(&mut handle).await;
        assert!(result.is_ok(), "terminate failed: {result:?}");
        assert!(handle.process_group().is_none(), "worker must be reaped");
        assert!(backend.terminate(&mut handle).await.is_ok(), "terminate must be idempotent");
    }
}
