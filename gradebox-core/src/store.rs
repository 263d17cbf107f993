//! Answer Key Store: the immutable exercise → expected answers mapping.
//!
//! Loaded once, eagerly, from a JSON document of the form
//!
//! ```json
//! { "unit1": { "answers": ["a", 2, true], "points": 10 } }
//! ```
//!
//! A missing or corrupt source is an error for the caller to treat as fatal;
//! there is no partially loaded store.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::answer::{Answer, SUBMISSION_ARITY};
use crate::error::CoreError;
use crate::id::ExerciseId;
use crate::verdict::{Outcome, VerdictRecord};

/// Environment variable naming the answer-key file.
pub const ENV_ANSWER_KEYS: &str = "GRADEBOX_ANSWER_KEYS";
/// Answer-key file used when [`ENV_ANSWER_KEYS`] is unset.
pub const DEFAULT_ANSWER_KEYS: &str = "data/unit_answers.json";

/// Expected answers and point value for one exercise.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ExerciseKey {
    /// Exercise this key belongs to.
    pub exercise_id: ExerciseId,
    /// Answers in submission order; always [`SUBMISSION_ARITY`] long.
    pub expected_answers: Vec<Answer>,
    /// Score awarded for a fully correct submission.
    pub points: u32,
}

impl ExerciseKey {
    /// Creates a key, checking the answer count.
    ///
    /// # Errors
    /// Returns [`CoreError::AnswerKeysCorrupt`] if `expected_answers` does not
    /// hold exactly [`SUBMISSION_ARITY`] values.
    pub fn new(exercise_id: ExerciseId, expected_answers: Vec<Answer>, points: u32) -> Result<Self, CoreError> {
        if expected_answers.len() != SUBMISSION_ARITY {
            return Err(CoreError::AnswerKeysCorrupt {
                reason: format!(
                    "exercise {exercise_id} has {} answers, expected {SUBMISSION_ARITY}",
                    expected_answers.len()
                ),
            });
        }
        Ok(Self { exercise_id, expected_answers, points })
    }

    /// Compares submitted answers against this key.
    ///
    /// Equal (same values, same order) yields the full score; anything else
    /// yields score 0 with both sequences for diagnostics.
    #[must_use]
    pub fn grade(&self, got: Vec<Answer>) -> VerdictRecord {
        if got == self.expected_answers {
            VerdictRecord::Outcome(Outcome::Correct { score: self.points })
        } else {
            VerdictRecord::Outcome(Outcome::Incorrect { got, expected: self.expected_answers.clone() })
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawKey {
    answers: Vec<Answer>,
    points: u32,
}

/// Read-only lookup from exercise id to [`ExerciseKey`].
#[derive(Debug, Clone, Default)]
pub struct AnswerKeyStore {
    keys: BTreeMap<ExerciseId, ExerciseKey>,
}

impl AnswerKeyStore {
    /// Reads and validates the answer-key file at `path`.
    ///
    /// # Errors
    /// Returns [`CoreError::AnswerKeysUnreadable`] if the file cannot be read
    /// and [`CoreError::AnswerKeysCorrupt`] or [`CoreError::InvalidExerciseId`]
    /// if its contents are invalid.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| CoreError::AnswerKeysUnreadable { path: path.to_owned(), source })?;
        Self::from_json(&raw)
    }

    /// Parses an answer-key document held in memory.
    ///
    /// # Errors
    /// Same as [`AnswerKeyStore::load`], minus the I/O case.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        let parsed: BTreeMap<String, RawKey> =
            serde_json::from_str(raw).map_err(|e| CoreError::AnswerKeysCorrupt { reason: e.to_string() })?;

        let mut keys = BTreeMap::new();
        for (id, key) in parsed {
            let exercise_id = ExerciseId::parse(id)?;
            let key = ExerciseKey::new(exercise_id.clone(), key.answers, key.points)?;
            keys.insert(exercise_id, key);
        }
        Ok(Self { keys })
    }

    /// Looks up the key for `exercise_id`. Ids in any other format are simply
    /// not found.
    #[must_use]
    pub fn lookup(&self, exercise_id: &str) -> Option<&ExerciseKey> {
        let id = ExerciseId::parse(exercise_id).ok()?;
        self.keys.get(&id)
    }

    /// Number of exercises in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// `true` if the store holds no exercises.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Exercise ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &ExerciseId> {
        self.keys.keys()
    }
}

impl FromIterator<ExerciseKey> for AnswerKeyStore {
    fn from_iter<I: IntoIterator<Item = ExerciseKey>>(iter: I) -> Self {
        Self { keys: iter.into_iter().map(|k| (k.exercise_id.clone(), k)).collect() }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    const SAMPLE: &str = r#"{
        "unit1": { "answers": ["a", 2, true], "points": 10 },
        "unit2": { "answers": [[1, 2], {"k": "v"}, null], "points": 5 }
    }"#;

    fn sample_store() -> AnswerKeyStore {
        match AnswerKeyStore::from_json(SAMPLE) {
            Ok(s) => s,
            Err(e) => panic!("sample must load: {e}"),
        }
    }

    #[test]
    fn lookup_finds_known_and_misses_unknown() {
        let store = sample_store();
        assert_eq!(store.len(), 2);
        let key = store.lookup("unit1").map(|k| k.points);
        assert_eq!(key, Some(10));
        assert!(store.lookup("unit3").is_none());
        assert!(store.lookup("1-1 ../etc").is_none(), "malformed ids are not found");
    }

    #[test]
    fn grade_requires_exact_order_and_type() {
        let store = sample_store();
        let Some(key) = store.lookup("unit1") else { panic!("unit1 missing") };
        assert!(key.grade(vec![json!("a"), json!(2), json!(true)]).success());
        assert!(!key.grade(vec![json!(2), json!("a"), json!(true)]).success());
        assert!(!key.grade(vec![json!("a"), json!(2.0), json!(true)]).success());
        assert!(!key.grade(vec![json!("a"), json!(2), json!(1)]).success());
    }

    #[test]
    fn wrong_answer_count_is_corrupt() {
        let raw = r#"{"unit1": {"answers": [1, 2], "points": 1}}"#;
        assert!(matches!(AnswerKeyStore::from_json(raw), Err(CoreError::AnswerKeysCorrupt { .. })));
    }

    #[test]
    fn non_normalised_id_fails_to_load() {
        let raw = r#"{"1 1": {"answers": [1, 2, 3], "points": 1}}"#;
        assert!(matches!(AnswerKeyStore::from_json(raw), Err(CoreError::InvalidExerciseId { .. })));
    }

    #[test]
    fn negative_points_are_corrupt() {
        let raw = r#"{"unit1": {"answers": [1, 2, 3], "points": -4}}"#;
        assert!(matches!(AnswerKeyStore::from_json(raw), Err(CoreError::AnswerKeysCorrupt { .. })));
    }

    #[test]
    fn load_reads_file_and_reports_missing_file() {
        let mut file = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => panic!("tempfile: {e}"),
        };
        if let Err(e) = file.write_all(SAMPLE.as_bytes()) {
            panic!("write: {e}");
        }
        let store = AnswerKeyStore::load(file.path());
        assert!(matches!(store, Ok(ref s) if s.len() == 2));

        let missing = AnswerKeyStore::load(Path::new("/nonexistent/unit_answers.json"));
        assert!(matches!(missing, Err(CoreError::AnswerKeysUnreadable { .. })));
    }
}
