//! Entry point for the `gradebox-worker` sandbox process.
//!
//! Protocol: one request on stdin, one verdict line on stdout, then exit.
//! Exit 0 means a verdict was written; 1 means the request was unreadable
//! (an error verdict is still written); 2 means no verdict could be produced.

use std::io::{Read, Write};
use std::process::ExitCode;

use gradebox_core::{AnswerKeyStore, VerdictRecord};
use gradebox_worker::{limits, pipeline, WorkerSettings, EXIT_INFRASTRUCTURE, EXIT_INVALID_REQUEST};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let settings = match WorkerSettings::from_env() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "worker settings rejected");
            return ExitCode::from(EXIT_INFRASTRUCTURE);
        }
    };

    let mut raw = Vec::new();
    if let Err(e) = std::io::stdin().lock().read_to_end(&mut raw) {
        tracing::warn!(error = %e, "failed to read request");
        raw.clear();
    }
    let request = match pipeline::parse_request(&raw) {
        Ok(request) => request,
        Err(verdict) => {
            return match emit(&verdict) {
                Ok(()) => ExitCode::from(EXIT_INVALID_REQUEST),
                Err(()) => ExitCode::from(EXIT_INFRASTRUCTURE),
            };
        }
    };

    let report = limits::apply(&settings.limits);
    if !report.is_complete() {
        tracing::warn!(failed = report.failed.len(), "running with partial resource limits");
    }

    let store = match AnswerKeyStore::load(&settings.answer_key_path) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(path = %settings.answer_key_path.display(), error = %e, "answer keys unavailable");
            return ExitCode::from(EXIT_INFRASTRUCTURE);
        }
    };
    tracing::debug!(exercises = store.len(), "answer keys loaded");

    let verdict = pipeline::evaluate(&request, &store);
    match emit(&verdict) {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::from(EXIT_INFRASTRUCTURE),
    }
}

/// Write the verdict as a single line on stdout.
fn emit(verdict: &VerdictRecord) -> Result<(), ()> {
    let payload = verdict.to_payload().map_err(|e| {
        tracing::error!(error = %e, "verdict could not be encoded");
    })?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{payload}").and_then(|()| stdout.flush()).map_err(|e| {
        tracing::error!(error = %e, "verdict could not be written");
    })
}
