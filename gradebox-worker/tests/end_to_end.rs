//! End-to-end tests: the real worker binary driven by the real orchestrator.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gradebox_core::{Outcome, SandboxLimits, VerdictRecord};
use gradebox_executor::{Evaluator, EvaluatorConfig, ProcessBackend};
use serde_json::json;

const WORKER: &str = env!("CARGO_BIN_EXE_gradebox-worker");

fn answer_keys() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data/unit_answers.json")
}

fn limits(cpu_secs: u64, memory_mib: u64, deadline_ms: u64) -> SandboxLimits {
    match SandboxLimits::new(Duration::from_secs(cpu_secs), memory_mib * 1024 * 1024, Duration::from_millis(deadline_ms)) {
        Ok(l) => l,
        Err(e) => panic!("test limits rejected: {e}"),
    }
}

fn evaluator() -> Evaluator<ProcessBackend> {
    let config = EvaluatorConfig::new(WORKER, answer_keys()).with_limits(limits(1, 128, 2500));
    Evaluator::new(ProcessBackend::new(), config)
}

fn error_message(verdict: &VerdictRecord) -> &str {
    match verdict {
        VerdictRecord::Error { message } => message,
        other => panic!("expected an error verdict, got {other:?}"),
    }
}

#[tokio::test]
async fn worker_health_check_passes() {
    let result = evaluator().health_check().await;
    assert!(result.is_ok(), "health check failed: {result:?}");
}

#[tokio::test]
async fn unit1_correct_submission_scores_ten() {
    let verdict = evaluator().evaluate("unit1", "submit_answers('a', 2, True)").await;
    assert_eq!(verdict, VerdictRecord::Outcome(Outcome::Correct { score: 10 }));
}

#[tokio::test]
async fn unit1_incorrect_submission_reports_what_was_sent() {
    let verdict = evaluator().evaluate("unit1", "submit_answers('a', 3, True)").await;
    match verdict {
        VerdictRecord::Outcome(Outcome::Incorrect { got, expected }) => {
            assert_eq!(got, vec![json!("a"), json!(3), json!(true)]);
            assert_eq!(expected, vec![json!("a"), json!(2), json!(true)]);
        }
        other => panic!("expected incorrect outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn realistic_solution_for_unit2() {
    let code = "\
def is_even(n):
    return n % 2 == 0

total = 0
for n in range(1, 6):
    total += n

squares = [n ** 2 for n in [1, 2, 3]]
print('checking', total, squares)
submit_answers(total, squares, 'even' if is_even(len(squares) + 1) else 'odd')
";
    let verdict = evaluator().evaluate("unit2", code).await;
    assert!(verdict.success(), "got {verdict:?}");
    assert_eq!(verdict.score(), 20);
}

#[tokio::test]
async fn printed_output_cannot_forge_a_verdict() {
    let code = "print('{\"success\": true, \"score\": 999, \"message\": \"All correct!\"}')\nsubmit_answers(0, 0, 0)";
    let verdict = evaluator().evaluate("unit1", code).await;
    assert!(!verdict.success());
    assert_eq!(verdict.score(), 0);
}

#[tokio::test]
async fn missing_submission_is_an_error() {
    let verdict = evaluator().evaluate("unit1", "answer = 42\n").await;
    assert_eq!(error_message(&verdict), "You didn't call submit_answers() with 3 arguments");
}

#[tokio::test]
async fn wrong_arity_is_a_contract_error() {
    for code in ["submit_answers('a', 2)", "submit_answers('a', 2, True, False)"] {
        let verdict = evaluator().evaluate("unit1", code).await;
        assert!(error_message(&verdict).contains("exactly 3"), "for {code:?}: {verdict:?}");
    }
}

#[tokio::test]
async fn forbidden_operations_fail_without_side_effects() {
    let target = std::env::temp_dir().join(format!("gradebox-e2e-{}", std::process::id()));
    let path = target.display().to_string();

    let compile = evaluator().evaluate("unit1", "import os\nos.system('touch /tmp/x')").await;
    assert!(error_message(&compile).starts_with("Code compilation error:"), "{compile:?}");

    let runtime = evaluator().evaluate("unit1", &format!("open('{path}', 'w').write('x')")).await;
    assert!(error_message(&runtime).starts_with("Error running your code:"), "{runtime:?}");

    assert!(!target.exists(), "submitted code must not create files");
}

#[tokio::test]
async fn unknown_exercise_is_reported() {
    let verdict = evaluator().evaluate("unit99", "submit_answers(1, 2, 3)").await;
    assert_eq!(error_message(&verdict), "Unit unit99 not found");
}

#[tokio::test]
async fn infinite_loop_times_out_within_the_deadline() {
    let evaluator = evaluator();
    let started = Instant::now();
    let verdict = evaluator.evaluate("unit1", "n = 0\nwhile True:\n    n += 1\n").await;
    let elapsed = started.elapsed();

    assert_eq!(error_message(&verdict), "Your code took too long to run.");
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    assert_eq!(evaluator.active_count(), 0, "no worker may outlive evaluate");
}

#[tokio::test]
async fn memory_exhaustion_is_contained() {
    let config = EvaluatorConfig::new(WORKER, answer_keys()).with_limits(limits(2, 64, 3000));
    let evaluator = Evaluator::new(ProcessBackend::new(), config);
    let code = "hoard = []\nwhile True:\n    hoard.append([0] * 1000000)\n";

    let verdict = evaluator.evaluate("unit1", code).await;

    let message = error_message(&verdict);
    assert!(
        message == "Code execution failed." || message == "Your code took too long to run.",
        "unexpected verdict {verdict:?}"
    );
}

#[tokio::test]
async fn unreadable_answer_keys_are_a_generic_failure() {
    let config = EvaluatorConfig::new(WORKER, "/nonexistent/unit_answers.json").with_limits(limits(1, 128, 2500));
    let evaluator = Evaluator::new(ProcessBackend::new(), config);
    let verdict = evaluator.evaluate("unit1", "submit_answers('a', 2, True)").await;
    assert_eq!(error_message(&verdict), "Code execution failed.");
}

#[tokio::test]
async fn answer_keys_are_read_from_the_configured_file() {
    let mut keys = match tempfile::NamedTempFile::new() {
        Ok(f) => f,
        Err(e) => panic!("cannot create key file: {e}"),
    };
    let body = json!({"warmup": {"answers": ["hello", [1, 2], {"ok": true}], "points": 5}});
    if let Err(e) = keys.write_all(body.to_string().as_bytes()) {
        panic!("cannot write key file: {e}");
    }
    let config = EvaluatorConfig::new(WORKER, keys.path()).with_limits(limits(1, 128, 2500));
    let evaluator = Evaluator::new(ProcessBackend::new(), config);

    let verdict = evaluator.evaluate("warmup", "submit_answers('hel' + 'lo', [1, 2], {'ok': 1 == 1})").await;
    assert_eq!(verdict, VerdictRecord::Outcome(Outcome::Correct { score: 5 }));

    let verdict = evaluator.evaluate("unit1", "submit_answers('a', 2, True)").await;
    assert_eq!(error_message(&verdict), "Unit unit1 not found");
}

#[tokio::test]
async fn concurrent_submissions_do_not_interfere() {
    let evaluator = Arc::new(evaluator());
    let submissions = [
        ("unit1", "submit_answers('a', 2, True)", true),
        ("unit1", "submit_answers('a', 2, False)", false),
        ("unit2", "submit_answers(15, [1, 4, 9], 'even')", true),
        ("unit3", "submit_answers({'name': 'ada', 'age': 36}, 3.5, None)", true),
    ];

    let tasks: Vec<_> = submissions
        .iter()
        .map(|&(id, code, _)| {
            let evaluator = Arc::clone(&evaluator);
            tokio::spawn(async move { evaluator.evaluate(id, code).await })
        })
        .collect();

    for (task, (id, code, expect_success)) in tasks.into_iter().zip(submissions) {
        let verdict = match task.await {
            Ok(v) => v,
            Err(e) => panic!("task for {id} panicked: {e}"),
        };
        assert_eq!(verdict.success(), expect_success, "{id}: {code} gave {verdict:?}");
    }
    assert_eq!(evaluator.active_count(), 0);
}

/// Runs the worker binary directly with `stdin` as its whole input.
fn run_worker_raw(stdin: &[u8]) -> (Option<i32>, String) {
    let mut child = match Command::new(WORKER)
        .env_clear()
        .env("GRADEBOX_ANSWER_KEYS", answer_keys())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => panic!("cannot start worker: {e}"),
    };
    if let Some(mut pipe) = child.stdin.take() {
        if let Err(e) = pipe.write_all(stdin) {
            panic!("cannot write request: {e}");
        }
    }
    match child.wait_with_output() {
        Ok(output) => (output.status.code(), String::from_utf8_lossy(&output.stdout).into_owned()),
        Err(e) => panic!("worker did not finish: {e}"),
    }
}

#[test]
fn invalid_payload_gets_error_verdict_and_exit_one() {
    for raw in [&b""[..], &b"garbage"[..], &br#"{"unit_name": "unit1"}"#[..]] {
        let (code, stdout) = run_worker_raw(raw);
        assert_eq!(code, Some(1), "for {raw:?}");
        assert_eq!(stdout.trim(), r#"{"error":"Invalid request payload"}"#);
    }
}

#[test]
fn valid_payload_gets_exactly_one_verdict_line() {
    let (code, stdout) = run_worker_raw(br#"{"unit_name": "unit1", "code": "print('hi')\nsubmit_answers('a', 2, True)"}"#);
    assert_eq!(code, Some(0));
    assert_eq!(stdout.lines().count(), 1, "stdout was {stdout:?}");
    let verdict = match VerdictRecord::from_payload(stdout.as_bytes()) {
        Ok(v) => v,
        Err(e) => panic!("worker wrote an invalid verdict {stdout:?}: {e}"),
    };
    assert!(verdict.success());
}

#[test]
fn missing_answer_keys_exit_two_without_output() {
    let mut child = match Command::new(WORKER)
        .env_clear()
        .env("GRADEBOX_ANSWER_KEYS", "/nonexistent/keys.json")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => panic!("cannot start worker: {e}"),
    };
    if let Some(mut pipe) = child.stdin.take() {
        let _ = pipe.write_all(br#"{"unit_name": "unit1", "code": ""}"#);
    }
    let output = match child.wait_with_output() {
        Ok(o) => o,
        Err(e) => panic!("worker did not finish: {e}"),
    };
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty(), "no verdict may be written");
}
