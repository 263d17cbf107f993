//! Evaluator configuration: which worker to run, where its answer keys
//! live, and the limits it runs under.

use std::path::{Path, PathBuf};

use gradebox_core::limits::{ENV_CPU_SECONDS, ENV_MEMORY_MIB};
use gradebox_core::store::{DEFAULT_ANSWER_KEYS, ENV_ANSWER_KEYS};
use gradebox_core::SandboxLimits;

use crate::ExecutorError;

/// Environment variable naming the worker executable.
pub const ENV_WORKER_BIN: &str = "GRADEBOX_WORKER_BIN";

/// File name of the worker executable built by this workspace.
pub const WORKER_BINARY_NAME: &str = "gradebox-worker";

/// Log filter forwarded to workers when the host has one set.
const ENV_LOG_FILTER: &str = "RUST_LOG";

const MIB: u64 = 1024 * 1024;

/// Everything needed to start a worker for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct EvaluatorConfig {
    /// Path to the worker executable.
    pub worker_program: PathBuf,

    /// Extra arguments passed to the worker.
    pub worker_args: Vec<String>,

    /// Answer-key file the worker loads at startup.
    pub answer_key_path: PathBuf,

    /// CPU and memory ceilings for the worker, plus the wall-clock deadline.
    pub limits: SandboxLimits,

    /// `RUST_LOG` value forwarded to the worker, if any.
    pub log_filter: Option<String>,
}

impl EvaluatorConfig {
    /// Create a config with default limits.
    #[must_use]
    pub fn new(worker_program: impl Into<PathBuf>, answer_key_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_program: worker_program.into(),
            worker_args: Vec::new(),
            answer_key_path: answer_key_path.into(),
            limits: SandboxLimits::default(),
            log_filter: None,
        }
    }

    /// Replace the worker arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.worker_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the limits.
    #[must_use]
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Read the configuration from `GRADEBOX_*` environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `GRADEBOX_WORKER_BIN` | `gradebox-worker` next to the current executable |
    /// | `GRADEBOX_ANSWER_KEYS` | `data/unit_answers.json` |
    /// | `GRADEBOX_CPU_SECONDS` | 2 |
    /// | `GRADEBOX_MEMORY_MIB` | 128 |
    /// | `GRADEBOX_DEADLINE_MS` | 3000 |
    ///
    /// # Errors
    /// Returns [`ExecutorError::Config`] if a limit override is malformed or
    /// the resulting limits are inconsistent.
    pub fn from_env() -> Result<Self, ExecutorError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`EvaluatorConfig::from_env`] with an explicit variable source.
    ///
    /// # Errors
    /// See [`EvaluatorConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ExecutorError> {
        let limits = SandboxLimits::from_lookup(&lookup)?;
        let worker_program = lookup(ENV_WORKER_BIN).map_or_else(default_worker_program, PathBuf::from);
        let answer_key_path = lookup(ENV_ANSWER_KEYS).unwrap_or_else(|| DEFAULT_ANSWER_KEYS.to_owned());

        Ok(Self {
            worker_program,
            worker_args: Vec::new(),
            answer_key_path: PathBuf::from(answer_key_path),
            limits,
            log_filter: lookup(ENV_LOG_FILTER),
        })
    }

    /// The complete environment a worker is started with.
    ///
    /// Workers inherit nothing from the host; these are the only variables
    /// they see.
    #[must_use]
    pub fn worker_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            (ENV_ANSWER_KEYS, self.answer_key_path.display().to_string()),
            (ENV_CPU_SECONDS, self.limits.cpu_seconds().to_string()),
            (ENV_MEMORY_MIB, (self.limits.memory_bytes / MIB).to_string()),
        ];
        if let Some(filter) = &self.log_filter {
            env.push((ENV_LOG_FILTER, filter.clone()));
        }
        env
    }
}

fn default_worker_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(Path::parent)
        .map_or_else(|| PathBuf::from(WORKER_BINARY_NAME), |dir| dir.join(WORKER_BINARY_NAME))
}
