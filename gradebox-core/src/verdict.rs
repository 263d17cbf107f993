//! The single structured result of one evaluation, and its wire format.
//!
//! On the wire a verdict is one JSON object, one of:
//!
//! ```text
//! {"error": "..."}
//! {"success": true,  "score": 10, "message": "All correct!"}
//! {"success": false, "score": 0, "got": [...], "expected": [...], "message": "..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::answer::Answer;
use crate::id::ExerciseId;

/// Returned when the wall-clock deadline or the CPU ceiling is hit.
pub const TIMEOUT_MESSAGE: &str = "Your code took too long to run.";
/// Returned when the worker exited abnormally or could not be started.
pub const EXECUTION_FAILED_MESSAGE: &str = "Code execution failed.";
/// Returned when the worker exited cleanly but its output was not a verdict.
pub const INVALID_RESPONSE_MESSAGE: &str = "Invalid response from code runner.";
/// Returned by the worker when its request payload is missing or malformed.
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid request payload";
/// Returned when the submitted code never called the submit capability.
pub const MISSING_SUBMISSION_MESSAGE: &str = "You didn't call submit_answers() with 3 arguments";

const CORRECT_MESSAGE: &str = "All correct!";
const INCORRECT_MESSAGE: &str = "Some answers are incorrect";

/// Message for an exercise id that is not in the answer-key store.
#[must_use]
pub fn unknown_exercise_message(id: &str) -> String {
    format!("Unit {id} not found")
}

/// Result of one evaluation attempt. Exactly one is produced per submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireVerdict", into = "WireVerdict")]
#[non_exhaustive]
pub enum VerdictRecord {
    /// The submission could not be graded.
    Error {
        /// Human-readable cause shown to the learner.
        message: String,
    },
    /// The submission ran and its answers were compared.
    Outcome(Outcome),
}

/// Comparison result for a submission that ran to completion.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Outcome {
    /// All answers matched, in order.
    Correct {
        /// Points awarded (the exercise's full point value).
        score: u32,
    },
    /// At least one answer differed in value or position.
    Incorrect {
        /// Answers the code submitted.
        got: Vec<Answer>,
        /// Answers the exercise expects.
        expected: Vec<Answer>,
    },
}

impl VerdictRecord {
    /// Builds an `Error` verdict.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Error verdict for a deadline or CPU-time overrun.
    #[must_use]
    pub fn timeout() -> Self {
        Self::error(TIMEOUT_MESSAGE)
    }

    /// Error verdict for an abnormal worker exit.
    #[must_use]
    pub fn execution_failed() -> Self {
        Self::error(EXECUTION_FAILED_MESSAGE)
    }

    /// Error verdict for unparseable worker output.
    #[must_use]
    pub fn invalid_response() -> Self {
        Self::error(INVALID_RESPONSE_MESSAGE)
    }

    /// Error verdict for an unknown exercise.
    #[must_use]
    pub fn unknown_exercise(id: &str) -> Self {
        Self::error(unknown_exercise_message(id))
    }

    /// `true` only for a correct outcome.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self, Self::Outcome(Outcome::Correct { .. }))
    }

    /// Points awarded; zero for errors and incorrect outcomes.
    #[must_use]
    pub fn score(&self) -> u32 {
        match self {
            Self::Outcome(Outcome::Correct { score }) => *score,
            _ => 0,
        }
    }

    /// The text shown alongside the verdict.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Error { message } => message,
            Self::Outcome(Outcome::Correct { .. }) => CORRECT_MESSAGE,
            Self::Outcome(Outcome::Incorrect { .. }) => INCORRECT_MESSAGE,
        }
    }

    /// Serialises the verdict as a single-line JSON payload.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] only if an answer cannot be encoded,
    /// which cannot happen for values built from JSON.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a verdict payload, rejecting anything that is not exactly one
    /// of the three wire shapes.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] for invalid JSON or an invalid shape.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Loose wire shape; validated into [`VerdictRecord`] on the way in.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireVerdict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    got: Option<Vec<Answer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expected: Option<Vec<Answer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<VerdictRecord> for WireVerdict {
    fn from(verdict: VerdictRecord) -> Self {
        let message = Some(verdict.message().to_owned());
        match verdict {
            VerdictRecord::Error { message } => Self { error: Some(message), ..Self::default() },
            VerdictRecord::Outcome(Outcome::Correct { score }) => {
                Self { success: Some(true), score: Some(score), message, ..Self::default() }
            }
            VerdictRecord::Outcome(Outcome::Incorrect { got, expected }) => Self {
                success: Some(false),
                score: Some(0),
                got: Some(got),
                expected: Some(expected),
                message,
                ..Self::default()
            },
        }
    }
}

impl TryFrom<WireVerdict> for VerdictRecord {
    type Error = String;

    fn try_from(wire: WireVerdict) -> Result<Self, String> {
        match wire {
            WireVerdict { error: Some(message), success: None, score: None, got: None, expected: None, .. } => {
                Ok(Self::Error { message })
            }
            WireVerdict { error: None, success: Some(true), score: Some(score), got: None, expected: None, .. } => {
                Ok(Self::Outcome(Outcome::Correct { score }))
            }
            WireVerdict {
                error: None,
                success: Some(false),
                score: Some(0),
                got: Some(got),
                expected: Some(expected),
                ..
            } => Ok(Self::Outcome(Outcome::Incorrect { got, expected })),
            _ => Err("payload is not a recognised verdict shape".to_owned()),
        }
    }
}

/// The request the orchestrator sends to a worker.
///
/// Serialised as `{"unit_name": "...", "code": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmissionRequest {
    /// Exercise the code is graded against.
    #[serde(rename = "unit_name")]
    pub exercise_id: String,
    /// Untrusted learner source.
    #[serde(rename = "code")]
    pub source_code: String,
}

impl SubmissionRequest {
    /// Creates a request.
    pub fn new(exercise_id: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self { exercise_id: exercise_id.into(), source_code: source_code.into() }
    }

    /// Serialises the request payload.
    ///
    /// # Errors
    /// Propagates [`serde_json::Error`]; two plain strings always encode.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a request payload.
    ///
    /// # Errors
    /// Returns a [`serde_json::Error`] for empty input, invalid JSON, missing
    /// or extra fields.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// The exercise id, if it matches the normalised format.
    #[must_use]
    pub fn exercise(&self) -> Option<ExerciseId> {
        ExerciseId::parse(self.exercise_id.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn to_value(v: &VerdictRecord) -> serde_json::Value {
        match serde_json::to_value(v) {
            Ok(value) => value,
            Err(e) => panic!("serialization failed: {e}"),
        }
    }

    #[test]
    fn correct_outcome_wire_shape() {
        let v = VerdictRecord::Outcome(Outcome::Correct { score: 10 });
        assert_eq!(to_value(&v), json!({"success": true, "score": 10, "message": "All correct!"}));
    }

    #[test]
    fn incorrect_outcome_wire_shape() {
        let v = VerdictRecord::Outcome(Outcome::Incorrect {
            got: vec![json!("a"), json!(3), json!(true)],
            expected: vec![json!("a"), json!(2), json!(true)],
        });
        assert_eq!(
            to_value(&v),
            json!({
                "success": false,
                "score": 0,
                "got": ["a", 3, true],
                "expected": ["a", 2, true],
                "message": "Some answers are incorrect",
            })
        );
    }

    #[test]
    fn error_wire_shape_has_only_error_field() {
        let v = VerdictRecord::unknown_exercise("unit9");
        assert_eq!(to_value(&v), json!({"error": "Unit unit9 not found"}));
    }

    #[test]
    fn parse_rejects_mixed_or_empty_shapes() {
        for bad in [
            r"{}",
            r#"{"error": "x", "success": true, "score": 1}"#,
            r#"{"success": true}"#,
            r#"{"success": false, "score": 3, "got": [], "expected": []}"#,
            r#"{"success": false, "score": 0, "got": []}"#,
            r#"{"error": 5}"#,
            r"[1, 2, 3]",
            "not json",
        ] {
            assert!(VerdictRecord::from_payload(bad.as_bytes()).is_err(), "must reject {bad}");
        }
    }

    #[test]
    fn parse_ignores_message_text() {
        let v = match VerdictRecord::from_payload(br#"{"success": true, "score": 4, "message": "whatever"}"#) {
            Ok(v) => v,
            Err(e) => panic!("valid payload rejected: {e}"),
        };
        assert!(v.success());
        assert_eq!(v.score(), 4);
        assert_eq!(v.message(), "All correct!");
    }

    #[test]
    fn request_uses_wire_field_names() {
        let req = SubmissionRequest::new("unit1", "submit_answers(1, 2, 3)");
        let payload = match req.to_payload() {
            Ok(p) => p,
            Err(e) => panic!("serialization failed: {e}"),
        };
        assert!(payload.contains("\"unit_name\":\"unit1\""), "got {payload}");
        assert!(payload.contains("\"code\":"), "got {payload}");
    }

    #[test]
    fn request_rejects_missing_and_unknown_fields() {
        assert!(SubmissionRequest::from_payload(b"").is_err());
        assert!(SubmissionRequest::from_payload(br#"{"unit_name": "unit1"}"#).is_err());
        assert!(SubmissionRequest::from_payload(br#"{"code": "x"}"#).is_err());
        assert!(SubmissionRequest::from_payload(br#"{"unit_name": "u", "code": "", "extra": 1}"#).is_err());
        assert!(SubmissionRequest::from_payload(br#"{"unit_name": "u", "code": ""}"#).is_ok());
    }

    fn arb_answer() -> impl proptest::strategy::Strategy<Value = Answer> {
        use proptest::prelude::*;
        let leaf = prop_oneof![
            Just(Answer::Null),
            any::<bool>().prop_map(Answer::from),
            any::<i64>().prop_map(Answer::from),
            "[a-z0-9 ]{0,8}".prop_map(Answer::from),
        ];
        leaf.prop_recursive(2, 8, 3, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..3).prop_map(Answer::Array),
                proptest::collection::btree_map("[a-z]{1,4}", inner, 0..3)
                    .prop_map(|m| Answer::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_verdict() -> impl proptest::strategy::Strategy<Value = VerdictRecord> {
        use proptest::prelude::*;
        prop_oneof![
            ".{0,40}".prop_map(VerdictRecord::error),
            any::<u32>().prop_map(|score| VerdictRecord::Outcome(Outcome::Correct { score })),
            (
                proptest::collection::vec(arb_answer(), 0..4),
                proptest::collection::vec(arb_answer(), 0..4)
            )
                .prop_map(|(got, expected)| VerdictRecord::Outcome(Outcome::Incorrect { got, expected })),
        ]
    }

    proptest::proptest! {
        #[test]
        fn proptest_verdict_survives_the_wire(verdict in arb_verdict()) {
            let payload = verdict.to_payload();
            proptest::prop_assert!(payload.is_ok());
            let payload = payload.unwrap_or_default();
            let parsed = VerdictRecord::from_payload(payload.as_bytes());
            proptest::prop_assert!(parsed.is_ok(), "payload {} did not parse", payload);
            proptest::prop_assert_eq!(parsed.ok(), Some(verdict));
        }
    }
}
