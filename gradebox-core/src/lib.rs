//! Core types for the gradebox sandboxed answer evaluator.
//!
//! Defines the data model shared by the orchestrator and the worker: exercise
//! ids, the answer-key store, submission requests, verdicts and their wire
//! format, and the sandbox resource limits.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod answer;
pub mod error;
pub mod examples;
pub mod id;
pub mod limits;
pub mod store;
pub mod verdict;

pub use answer::{Answer, SUBMISSION_ARITY, SUBMIT_FUNCTION};
pub use error::CoreError;
pub use id::{ContentHash, ExerciseId};
pub use limits::SandboxLimits;
pub use store::{AnswerKeyStore, ExerciseKey};
pub use verdict::{Outcome, SubmissionRequest, VerdictRecord};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::examples::{example_keys, example_store};

    #[test]
    fn exercise_id_accepts_normalised_format() {
        assert!(ExerciseId::parse("unit1").is_ok());
        assert!(ExerciseId::parse("unit_1-b").is_ok());
        assert!(ExerciseId::parse("1").is_ok());
    }

    #[test]
    fn exercise_id_rejects_bad_input() {
        assert!(ExerciseId::parse("").is_err());
        assert!(ExerciseId::parse("unit 1").is_err());
        assert!(ExerciseId::parse("../unit1").is_err());
        assert!(ExerciseId::parse("x".repeat(65)).is_err());
    }

    #[test]
    fn content_hash_display_shows_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xde;
        bytes[1] = 0xad;
        bytes[31] = 0xff;
        let hash = ContentHash::new(bytes);
        let s = hash.to_string();
        assert!(s.starts_with("dead"), "expected hex starting with 'dead', got {s}");
        assert!(s.ends_with("ff"), "expected hex ending with 'ff', got {s}");
        assert_eq!(s.len(), 64, "SHA-256 hex must be 64 chars");
        assert_eq!(hash.short(), "dead0000");
    }

    #[test]
    fn content_hash_of_empty_is_known_sha256() {
        assert_eq!(
            ContentHash::of(b"").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn example_keys_all_valid() {
        let keys = example_keys();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| k.expected_answers.len() == SUBMISSION_ARITY));
        assert_eq!(keys[0].exercise_id.as_str(), "unit1");
        assert_eq!(keys[0].points, 10);
    }

    #[test]
    fn example_store_matches_shipped_data_file() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../data/unit_answers.json");
        let shipped = match AnswerKeyStore::load(&path) {
            Ok(s) => s,
            Err(e) => panic!("shipped answer keys must load: {e}"),
        };
        let examples = example_store();
        assert_eq!(shipped.len(), examples.len());
        for id in examples.ids() {
            assert_eq!(shipped.lookup(id.as_str()), examples.lookup(id.as_str()), "mismatch for {id}");
        }
    }

    #[test]
    fn unit1_scenario_grades_as_documented() {
        let store = example_store();
        let Some(key) = store.lookup("unit1") else { panic!("unit1 missing") };

        let pass = key.grade(vec![json!("a"), json!(2), json!(true)]);
        assert!(pass.success());
        assert_eq!(pass.score(), 10);

        let fail = key.grade(vec![json!("a"), json!(3), json!(true)]);
        assert!(!fail.success());
        assert_eq!(fail.score(), 0);
        match fail {
            VerdictRecord::Outcome(Outcome::Incorrect { got, expected }) => {
                assert_eq!(got, vec![json!("a"), json!(3), json!(true)]);
                assert_eq!(expected, key.expected_answers);
            }
            other => panic!("expected Incorrect, got {other:?}"),
        }
    }

    #[test]
    fn default_limits_are_valid() {
        let limits = SandboxLimits::default();
        assert!(limits.validate().is_ok());
        assert_eq!(limits.cpu_seconds(), 2);
        assert_eq!(limits.memory_bytes, 128 * 1024 * 1024);
        assert!(limits.deadline > limits.cpu_time);
    }

    #[test]
    fn deadline_must_exceed_cpu_time() {
        let equal = SandboxLimits::new(Duration::from_secs(2), 1 << 27, Duration::from_secs(2));
        assert!(matches!(equal, Err(CoreError::InvalidLimits { .. })));
        let tiny_memory = SandboxLimits::new(Duration::from_secs(1), 1024, Duration::from_secs(2));
        assert!(tiny_memory.is_err());
    }

    #[test]
    fn limits_from_lookup_applies_overrides() {
        let vars = std::collections::HashMap::from([
            (limits::ENV_CPU_SECONDS, "4"),
            (limits::ENV_MEMORY_MIB, "64"),
        ]);
        let limits = match SandboxLimits::from_lookup(|name| vars.get(name).map(|v| (*v).to_owned())) {
            Ok(l) => l,
            Err(e) => panic!("valid overrides rejected: {e}"),
        };
        assert_eq!(limits.cpu_time, Duration::from_secs(4));
        assert_eq!(limits.memory_bytes, 64 * 1024 * 1024);
        assert_eq!(limits.deadline, Duration::from_secs(5), "deadline follows a raised cpu ceiling");

        let none = SandboxLimits::from_lookup(|_| None);
        assert!(matches!(none, Ok(l) if l == SandboxLimits::default()));
    }

    #[test]
    fn limits_from_lookup_rejects_garbage() {
        let garbage = SandboxLimits::from_lookup(|name| (name == limits::ENV_MEMORY_MIB).then(|| "lots".to_owned()));
        assert!(matches!(garbage, Err(CoreError::InvalidLimits { .. })));
        let short_deadline =
            SandboxLimits::from_lookup(|name| (name == limits::ENV_DEADLINE_MS).then(|| "500".to_owned()));
        assert!(short_deadline.is_err(), "deadline below the cpu ceiling must be rejected");
    }
}
