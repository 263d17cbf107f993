//! Resource ceilings shared by the orchestrator and the worker.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default CPU-time ceiling applied inside the worker.
pub const DEFAULT_CPU_TIME: Duration = Duration::from_secs(2);
/// Default address-space ceiling applied inside the worker: 128 MiB.
pub const DEFAULT_MEMORY_BYTES: u64 = 128 * 1024 * 1024;
/// Default wall-clock deadline enforced by the orchestrator.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(3);
/// Smallest address space a worker can start in.
pub const MIN_MEMORY_BYTES: u64 = 16 * 1024 * 1024;

/// Override for the CPU ceiling, in whole seconds.
pub const ENV_CPU_SECONDS: &str = "GRADEBOX_CPU_SECONDS";
/// Override for the memory ceiling, in MiB.
pub const ENV_MEMORY_MIB: &str = "GRADEBOX_MEMORY_MIB";
/// Override for the wall-clock deadline, in milliseconds.
pub const ENV_DEADLINE_MS: &str = "GRADEBOX_DEADLINE_MS";

/// CPU, memory and wall-clock limits for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SandboxLimits {
    /// CPU time the worker may consume (whole seconds are enforced).
    pub cpu_time: Duration,
    /// Address-space ceiling for the worker process.
    pub memory_bytes: u64,
    /// Wall-clock time the orchestrator waits before killing the worker.
    pub deadline: Duration,
}

impl SandboxLimits {
    /// Creates and validates a limit set.
    ///
    /// # Errors
    /// See [`SandboxLimits::validate`].
    pub fn new(cpu_time: Duration, memory_bytes: u64, deadline: Duration) -> Result<Self, CoreError> {
        let limits = Self { cpu_time, memory_bytes, deadline };
        limits.validate()?;
        Ok(limits)
    }

    /// Checks the invariants between the limits.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidLimits`] if the CPU ceiling is below one
    /// second, memory is below [`MIN_MEMORY_BYTES`], or the deadline is not
    /// strictly greater than the CPU ceiling.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cpu_time < Duration::from_secs(1) {
            return Err(CoreError::InvalidLimits { reason: "cpu time must be at least 1s".to_owned() });
        }
        if self.memory_bytes < MIN_MEMORY_BYTES {
            return Err(CoreError::InvalidLimits {
                reason: format!("memory must be at least {MIN_MEMORY_BYTES} bytes"),
            });
        }
        if self.deadline <= self.cpu_time {
            return Err(CoreError::InvalidLimits {
                reason: format!(
                    "deadline {}ms must exceed cpu time {}ms",
                    self.deadline.as_millis(),
                    self.cpu_time.as_millis()
                ),
            });
        }
        Ok(())
    }

    /// Builds limits from `GRADEBOX_*` style overrides, falling back to the
    /// defaults for anything `lookup` does not provide.
    ///
    /// When only the CPU ceiling is raised, the deadline follows it so that
    /// it stays one second ahead.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidLimits`] for a value that is not a
    /// non-negative integer, or for a combination [`SandboxLimits::validate`]
    /// rejects.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let number = |name: &str| -> Result<Option<u64>, CoreError> {
            lookup(name)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|_| CoreError::InvalidLimits {
                        reason: format!("{name} must be a non-negative integer, got '{raw}'"),
                    })
                })
                .transpose()
        };

        let cpu_time = number(ENV_CPU_SECONDS)?.map_or(DEFAULT_CPU_TIME, Duration::from_secs);
        let memory_bytes = match number(ENV_MEMORY_MIB)? {
            Some(mib) => mib.checked_mul(1024 * 1024).ok_or_else(|| CoreError::InvalidLimits {
                reason: format!("{ENV_MEMORY_MIB} is too large"),
            })?,
            None => DEFAULT_MEMORY_BYTES,
        };
        let deadline = number(ENV_DEADLINE_MS)?
            .map_or_else(|| DEFAULT_DEADLINE.max(cpu_time + Duration::from_secs(1)), Duration::from_millis);

        Self::new(cpu_time, memory_bytes, deadline)
    }

    /// CPU ceiling in whole seconds, rounded up.
    #[must_use]
    pub fn cpu_seconds(&self) -> u64 {
        self.cpu_time.as_secs() + u64::from(self.cpu_time.subsec_nanos() > 0)
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self { cpu_time: DEFAULT_CPU_TIME, memory_bytes: DEFAULT_MEMORY_BYTES, deadline: DEFAULT_DEADLINE }
    }
}
