//! Submission runner: feeds one request to a worker and collects its output.
//!
//! Writing the request, draining stdout and stderr, and reaping the worker
//! all happen under a single wall-clock deadline. A worker that outlives the
//! deadline is killed along with its process group before the runner returns.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gradebox_core::VerdictRecord;
use nix::sys::signal::Signal;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;
use uuid::Uuid;

use crate::{ExecutorError, WorkerBackend, WorkerHandle};

/// Most verdict bytes read from a worker's stdout: 1 MiB.
pub const MAX_STDOUT_BYTES: usize = 1024 * 1024;

/// Most diagnostic bytes kept from a worker's stderr.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Everything a worker produced before it exited.
#[derive(Debug)]
#[non_exhaustive]
pub struct WorkerOutput {
    /// Worker the output came from.
    pub worker_id: Uuid,
    /// How the worker exited.
    pub status: ExitStatus,
    /// Verdict channel, truncated to the runner's stdout limit.
    pub stdout: Vec<u8>,
    /// `true` if the worker wrote more than the stdout limit.
    pub stdout_overflowed: bool,
    /// Worker logs, truncated.
    pub stderr: Vec<u8>,
    /// Wall time from first write to reap.
    pub elapsed: Duration,
}

impl WorkerOutput {
    /// Turn the worker's exit into a verdict.
    ///
    /// - killed by `SIGXCPU`: the CPU ceiling was hit, a timeout
    /// - any other signal or non-zero exit: execution failed, stdout ignored
    /// - zero exit: stdout must hold exactly one verdict payload
    #[must_use]
    pub fn verdict(&self) -> VerdictRecord {
        if self.status.signal() == Some(Signal::SIGXCPU as i32) {
            return VerdictRecord::timeout();
        }
        if !self.status.success() {
            return VerdictRecord::execution_failed();
        }
        if self.stdout_overflowed {
            return VerdictRecord::invalid_response();
        }
        VerdictRecord::from_payload(&self.stdout).unwrap_or_else(|_| VerdictRecord::invalid_response())
    }
}

/// Drives one worker from request to exit.
///
/// # Cancel Safety
/// Not fully cancel safe: dropping the future kills the worker through
/// `kill_on_drop` but leaves any other members of its process group alone.
pub struct SubmissionRunner<B: WorkerBackend> {
    backend: Arc<B>,
    stdout_limit: usize,
}

impl<B: WorkerBackend> SubmissionRunner<B> {
    /// Create a runner that uses `backend` to kill overdue workers.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend, stdout_limit: MAX_STDOUT_BYTES }
    }

    /// Create a runner with a custom stdout limit.
    #[must_use]
    pub fn with_stdout_limit(backend: Arc<B>, stdout_limit: usize) -> Self {
        Self { backend, stdout_limit }
    }

    /// Send `payload` to the worker, close its stdin, and wait for it to
    /// exit within `deadline`.
    ///
    /// The worker is always reaped before this returns.
    ///
    /// # Errors
    /// Returns [`ExecutorError::DeadlineExceeded`] if the worker was still
    /// running at the deadline (it has been killed).
    /// Returns [`ExecutorError::SpawnFailed`] if the worker's stdio is not piped.
    /// Returns [`ExecutorError::Io`] if talking to the worker failed.
    pub async fn collect(
        &self,
        mut handle: WorkerHandle,
        payload: &[u8],
        deadline: Duration,
    ) -> Result<WorkerOutput, ExecutorError> {
        let worker_id = handle.id;
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (handle.process.stdin.take(), handle.process.stdout.take(), handle.process.stderr.take())
        else {
            self.reap(&mut handle).await;
            return Err(ExecutorError::SpawnFailed("worker stdio not piped".to_owned()));
        };

        let started = Instant::now();
        let stdout_limit = self.stdout_limit;
        let process = &mut handle.process;
        let exchange = async move {
            let ((), out, err) = tokio::try_join!(
                feed(stdin, payload),
                read_capped(stdout, stdout_limit),
                read_capped(stderr, MAX_STDERR_BYTES),
            )?;
            let status = process.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let outcome = tokio::time::timeout(deadline, exchange).await;
        let elapsed = started.elapsed();

        let (status, out, err) = match outcome {
            Ok(Ok(collected)) => collected,
            Ok(Err(e)) => {
                tracing::warn!(worker_id = %worker_id, error = %e, "worker I/O failed");
                self.reap(&mut handle).await;
                return Err(ExecutorError::Io(e));
            }
            Err(_) => {
                tracing::warn!(
                    worker_id = %worker_id,
                    deadline_ms = deadline.as_millis(),
                    "worker missed its deadline, killing process group"
                );
                self.reap(&mut handle).await;
                return Err(ExecutorError::DeadlineExceeded { worker_id, deadline_ms: deadline.as_millis() });
            }
        };

        replay_stderr(worker_id, &err.bytes);
        tracing::debug!(
            worker_id = %worker_id,
            %status,
            stdout_bytes = out.bytes.len(),
            elapsed_ms = elapsed.as_millis(),
            "worker exited"
        );

        Ok(WorkerOutput {
            worker_id,
            status,
            stdout: out.bytes,
            stdout_overflowed: out.overflowed,
            stderr: err.bytes,
            elapsed,
        })
    }

    async fn reap(&self, handle: &mut WorkerHandle) {
        if let Err(e) = self.backend.terminate(handle).await {
            tracing::error!(worker_id = %handle.id, error = %e, "failed to terminate worker");
        }
    }
}

/// Bytes read from one pipe, up to a limit.
struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

/// Write the request and close stdin.
///
/// A worker that exits without reading its input closes the pipe early; that
/// shows up in its exit status, not here.
async fn feed(mut stdin: ChildStdin, payload: &[u8]) -> std::io::Result<()> {
    match stdin.write_all(payload).await {
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Read a pipe to EOF, keeping at most `limit` bytes and discarding the rest
/// so the writer never blocks.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<Captured> {
    let mut bytes = Vec::new();
    (&mut reader).take(u64::try_from(limit).unwrap_or(u64::MAX)).read_to_end(&mut bytes).await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(Captured { bytes, overflowed: discarded > 0 })
}

fn replay_stderr(worker_id: Uuid, stderr: &[u8]) {
    for line in String::from_utf8_lossy(stderr).lines().filter(|l| !l.trim().is_empty()) {
        tracing::debug!(worker_id = %worker_id, line, "worker stderr");
    }
}
