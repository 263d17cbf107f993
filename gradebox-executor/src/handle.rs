//! Worker handle: one spawned sandbox worker process.

use chrono::{DateTime, Utc};
use nix::unistd::Pid;
use uuid::Uuid;

/// A handle to a running sandbox worker.
///
/// The child is spawned with `kill_on_drop`, so dropping the handle kills the
/// worker itself but not the rest of its process group. Use
/// [`crate::WorkerBackend::terminate`] for a full cleanup.
#[derive(Debug)]
#[non_exhaustive]
pub struct WorkerHandle {
    /// Unique identifier for this worker, used in logs and the registry.
    pub id: Uuid,

    /// OS process id at spawn time. The worker leads its own process group,
    /// so this is also the group id.
    pub pid: Option<u32>,

    /// The worker child process.
    pub process: tokio::process::Child,

    /// Timestamp when the worker was spawned.
    pub created_at: DateTime<Utc>,
}

impl WorkerHandle {
    /// Wraps a freshly spawned child.
    #[must_use]
    pub fn new(id: Uuid, process: tokio::process::Child) -> Self {
        Self {
            id,
            pid: process.id(),
            process,
            created_at: Utc::now(),
        }
    }

    /// The worker's process group, or `None` once the child has been reaped
    /// and its id may already belong to someone else.
    #[must_use]
    pub fn process_group(&self) -> Option<Pid> {
        self.process
            .id()
            .and_then(|pid| i32::try_from(pid).ok())
            .map(Pid::from_raw)
    }
}
