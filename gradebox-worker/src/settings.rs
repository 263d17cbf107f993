//! Worker settings, read from the environment the orchestrator sets.

use std::path::PathBuf;

use gradebox_core::store::{DEFAULT_ANSWER_KEYS, ENV_ANSWER_KEYS};
use gradebox_core::{CoreError, SandboxLimits};

use crate::WorkerLimits;

/// Where the answer keys are and how tightly to limit ourselves.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct WorkerSettings {
    pub answer_key_path: PathBuf,
    pub limits: WorkerLimits,
}

impl WorkerSettings {
    /// Read `GRADEBOX_ANSWER_KEYS`, `GRADEBOX_CPU_SECONDS` and
    /// `GRADEBOX_MEMORY_MIB`, with the same defaults as the orchestrator.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidLimits`] for a malformed limit.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`WorkerSettings::from_env`] with an explicit variable source.
    ///
    /// # Errors
    /// See [`WorkerSettings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let limits = SandboxLimits::from_lookup(&lookup)?;
        Ok(Self {
            answer_key_path: PathBuf::from(lookup(ENV_ANSWER_KEYS).unwrap_or_else(|| DEFAULT_ANSWER_KEYS.to_owned())),
            limits: WorkerLimits::from(&limits),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_ceilings() {
        let settings = match WorkerSettings::from_lookup(|_| None) {
            Ok(s) => s,
            Err(e) => panic!("defaults rejected: {e}"),
        };
        assert_eq!(settings.answer_key_path, PathBuf::from("data/unit_answers.json"));
        assert_eq!(settings.limits, WorkerLimits::new(2, 128 * 1024 * 1024));
    }

    #[test]
    fn overrides_are_honoured() {
        let settings = WorkerSettings::from_lookup(|name| match name {
            "GRADEBOX_ANSWER_KEYS" => Some("/srv/keys.json".to_owned()),
            "GRADEBOX_CPU_SECONDS" => Some("5".to_owned()),
            "GRADEBOX_MEMORY_MIB" => Some("256".to_owned()),
            _ => None,
        });
        let settings = match settings {
            Ok(s) => s,
            Err(e) => panic!("overrides rejected: {e}"),
        };
        assert_eq!(settings.answer_key_path, PathBuf::from("/srv/keys.json"));
        assert_eq!(settings.limits, WorkerLimits::new(5, 256 * 1024 * 1024));
    }

    #[test]
    fn malformed_limit_is_an_error() {
        let result = WorkerSettings::from_lookup(|name| (name == "GRADEBOX_CPU_SECONDS").then(|| "two".to_owned()));
        assert!(matches!(result, Err(CoreError::InvalidLimits { .. })));
    }
}
