//! OS resource ceilings the worker places on itself before running code.
//!
//! Every limit is best effort: a platform or parent that refuses one is
//! logged and recorded in the [`LimitReport`], and the worker carries on.
//! The orchestrator's wall-clock deadline still applies either way.

use gradebox_core::SandboxLimits;
use nix::errno::Errno;
use nix::sys::resource::{setrlimit, Resource};

/// Ceilings applied to the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct WorkerLimits {
    /// CPU seconds before the kernel sends `SIGXCPU`.
    pub cpu_seconds: u64,
    /// Address-space ceiling in bytes.
    pub memory_bytes: u64,
}

impl WorkerLimits {
    #[must_use]
    pub fn new(cpu_seconds: u64, memory_bytes: u64) -> Self {
        Self { cpu_seconds, memory_bytes }
    }
}

impl From<&SandboxLimits> for WorkerLimits {
    fn from(limits: &SandboxLimits) -> Self {
        Self::new(limits.cpu_seconds(), limits.memory_bytes)
    }
}

/// Which limits took effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitReport {
    pub applied: Vec<Resource>,
    pub failed: Vec<(Resource, Errno)>,
}

impl LimitReport {
    /// `true` when every limit was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The rlimits for `limits`, as `(resource, soft, hard)`.
///
/// The CPU hard limit sits one second above the soft one so the kernel
/// delivers `SIGXCPU` before it resorts to `SIGKILL`. Core dumps, file
/// writes and new processes are forbidden outright.
#[must_use]
pub fn plan(limits: &WorkerLimits) -> [(Resource, u64, u64); 5] {
    [
        (Resource::RLIMIT_CPU, limits.cpu_seconds, limits.cpu_seconds.saturating_add(1)),
        (Resource::RLIMIT_AS, limits.memory_bytes, limits.memory_bytes),
        (Resource::RLIMIT_CORE, 0, 0),
        (Resource::RLIMIT_FSIZE, 0, 0),
        (Resource::RLIMIT_NPROC, 0, 0),
    ]
}

/// Apply `limits` to the calling process.
///
/// Irreversible: hard limits can only be lowered, so call this once, right
/// before untrusted code runs.
pub fn apply(limits: &WorkerLimits) -> LimitReport {
    let mut report = LimitReport::default();
    for (resource, soft, hard) in plan(limits) {
        match setrlimit(resource, soft, hard) {
            Ok(()) => report.applied.push(resource),
            Err(errno) => {
                tracing::warn!(?resource, soft, hard, %errno, "could not apply resource limit");
                report.failed.push((resource, errno));
            }
        }
    }
    tracing::debug!(applied = report.applied.len(), failed = report.failed.len(), "resource limits applied");
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_every_ceiling() {
        let plan = plan(&WorkerLimits::new(2, 128 * 1024 * 1024));
        assert_eq!(plan[0], (Resource::RLIMIT_CPU, 2, 3));
        assert_eq!(plan[1], (Resource::RLIMIT_AS, 128 * 1024 * 1024, 128 * 1024 * 1024));
        for (resource, soft, hard) in &plan[2..] {
            assert_eq!((*soft, *hard), (0, 0), "{resource:?} must be zero");
        }
    }

    #[test]
    fn worker_limits_follow_sandbox_limits() {
        let limits = WorkerLimits::from(&SandboxLimits::default());
        assert_eq!(limits, WorkerLimits::new(2, 128 * 1024 * 1024));
    }

    #[test]
    fn cpu_hard_limit_never_overflows() {
        let plan = plan(&WorkerLimits::new(u64::MAX, u64::MAX));
        assert_eq!(plan[0].2, u64::MAX);
    }

    #[test]
    fn report_completeness() {
        let mut report = LimitReport::default();
        assert!(report.is_complete());
        report.failed.push((Resource::RLIMIT_NPROC, Errno::EPERM));
        assert!(!report.is_complete());
    }
}
