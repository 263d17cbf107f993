//! The worker's verdict pipeline: request in, exactly one verdict out.
//!
//! Every failure of the submitted code becomes an `Error` verdict here.
//! Nothing in this module panics or exits; that is left to `main`.

use gradebox_core::verdict::{INVALID_REQUEST_MESSAGE, MISSING_SUBMISSION_MESSAGE};
use gradebox_core::{AnswerKeyStore, ContentHash, SubmissionRequest, VerdictRecord, SUBMISSION_ARITY};
use gradebox_engine::EngineError;

/// Parse the request read from stdin.
///
/// # Errors
/// Returns the `Invalid request payload` verdict for empty input, invalid
/// JSON, or a payload without exactly the `unit_name` and `code` fields.
pub fn parse_request(raw: &[u8]) -> Result<SubmissionRequest, VerdictRecord> {
    SubmissionRequest::from_payload(raw).map_err(|e| {
        tracing::warn!(bytes = raw.len(), error = %e, "rejecting request payload");
        VerdictRecord::error(INVALID_REQUEST_MESSAGE)
    })
}

/// Grade one request against the answer keys.
///
/// An unknown exercise is reported without running the code.
#[must_use]
pub fn evaluate(request: &SubmissionRequest, store: &AnswerKeyStore) -> VerdictRecord {
    let Some(key) = store.lookup(&request.exercise_id) else {
        tracing::info!(exercise_id = %request.exercise_id, "unknown exercise");
        return VerdictRecord::unknown_exercise(&request.exercise_id);
    };

    let source_hash = ContentHash::of(request.source_code.as_bytes());
    tracing::debug!(exercise_id = %key.exercise_id, source_hash = %source_hash, "executing submission");

    let execution = match gradebox_engine::run(&request.source_code, SUBMISSION_ARITY) {
        Ok(execution) => execution,
        Err(e) => {
            tracing::info!(exercise_id = %key.exercise_id, source_hash = %source_hash, error = %e, "submission faulted");
            return VerdictRecord::error(engine_error_message(&e));
        }
    };

    if execution.answers.is_empty() {
        return VerdictRecord::error(MISSING_SUBMISSION_MESSAGE);
    }

    let verdict = key.grade(execution.answers.into_inner());
    tracing::info!(
        exercise_id = %key.exercise_id,
        source_hash = %source_hash,
        success = verdict.success(),
        score = verdict.score(),
        "submission graded"
    );
    verdict
}

fn engine_error_message(error: &EngineError) -> String {
    match error {
        EngineError::Compile { .. } => format!("Code compilation error: {error}"),
        EngineError::Contract(message) => message.clone(),
        _ => format!("Error running your code: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use gradebox_core::examples::example_store;
    use gradebox_core::{Outcome, VerdictRecord};
    use serde_json::json;

    use super::*;

    fn grade(exercise_id: &str, code: &str) -> VerdictRecord {
        evaluate(&SubmissionRequest::new(exercise_id, code), &example_store())
    }

    fn error_message(verdict: &VerdictRecord) -> &str {
        match verdict {
            VerdictRecord::Error { message } => message,
            other => panic!("expected an error verdict, got {other:?}"),
        }
    }

    #[test]
    fn unit1_correct_answers_score_full_points() {
        let verdict = grade("unit1", "submit_answers('a', 2, True)");
        assert_eq!(verdict, VerdictRecord::Outcome(Outcome::Correct { score: 10 }));
    }

    #[test]
    fn unit1_wrong_answer_reports_got_and_expected() {
        let verdict = grade("unit1", "submit_answers('a', 3, True)");
        assert_eq!(
            verdict,
            VerdictRecord::Outcome(Outcome::Incorrect {
                got: vec![json!("a"), json!(3), json!(true)],
                expected: vec![json!("a"), json!(2), json!(true)],
            })
        );
    }

    #[test]
    fn order_matters() {
        let verdict = grade("unit1", "submit_answers(2, 'a', True)");
        assert!(!verdict.success());
        assert_eq!(verdict.score(), 0);
    }

    #[test]
    fn grading_is_type_strict() {
        assert!(!grade("unit1", "submit_answers('a', 2.0, True)").success());
        assert!(!grade("unit1", "submit_answers('a', 2, 1)").success());
    }

    #[test]
    fn structured_answers_are_compared_structurally() {
        let code = "squares = [n * n for n in range(1, 4)]\n\
                    total = sum(range(1, 6))\n\
                    submit_answers(total, squares, 'even' if total % 2 == 0 else 'odd')";
        assert!(!grade("unit2", code).success(), "15 is odd");

        let code = "submit_answers(15, [1, 4, 9], 'even')";
        assert_eq!(grade("unit2", code).score(), 20);

        let code = "submit_answers({'age': 36, 'name': 'ada'}, 7 / 2, None)";
        assert_eq!(grade("unit3", code).score(), 15, "dict key order must not matter");
    }

    #[test]
    fn unknown_exercise_runs_nothing() {
        let verdict = grade("unit99", "while True:\n    pass\n");
        assert_eq!(error_message(&verdict), "Unit unit99 not found");
    }

    #[test]
    fn missing_submission_is_reported() {
        let verdict = grade("unit1", "x = 1\nprint(x)\n");
        assert_eq!(error_message(&verdict), "You didn't call submit_answers() with 3 arguments");
    }

    #[test]
    fn compile_errors_are_prefixed() {
        let verdict = grade("unit1", "import os\nsubmit_answers('a', 2, True)");
        let message = error_message(&verdict);
        assert!(message.starts_with("Code compilation error: line 1:"), "{message}");
    }

    #[test]
    fn runtime_errors_are_prefixed() {
        let verdict = grade("unit1", "open('/etc/passwd')");
        assert_eq!(error_message(&verdict), "Error running your code: line 1: name 'open' is not defined");
    }

    #[test]
    fn contract_violations_are_reported_verbatim() {
        let verdict = grade("unit1", "submit_answers('a', 2)");
        let message = error_message(&verdict);
        assert!(!message.starts_with("Error running"), "{message}");
        assert!(message.contains("exactly 3"), "{message}");
    }

    #[test]
    fn parse_request_accepts_the_wire_format() {
        let request = match parse_request(br#"{"unit_name": "unit1", "code": "pass"}"#) {
            Ok(r) => r,
            Err(v) => panic!("valid request rejected: {v:?}"),
        };
        assert_eq!(request.exercise_id, "unit1");
        assert_eq!(request.source_code, "pass");
    }

    #[test]
    fn parse_request_rejects_bad_payloads() {
        for raw in [&b""[..], &b"{}"[..], &b"not json"[..], &br#"{"unit_name": 1, "code": ""}"#[..]] {
            match parse_request(raw) {
                Err(verdict) => assert_eq!(error_message(&verdict), "Invalid request payload"),
                Ok(r) => panic!("accepted {r:?}"),
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn proptest_any_submitted_integers_are_echoed_back(a in -1000i64..1000, b in -1000i64..1000, c in -1000i64..1000) {
            let verdict = grade("unit1", &format!("submit_answers({a}, {b}, {c})"));
            match verdict {
                VerdictRecord::Outcome(Outcome::Incorrect { got, .. }) => {
                    proptest::prop_assert_eq!(got, vec![json!(a), json!(b), json!(c)]);
                }
                other => proptest::prop_assert!(false, "unexpected verdict {:?}", other),
            }
        }
    }
}
