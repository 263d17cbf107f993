//! Restricted execution engine for untrusted learner scripts.
//!
//! Compiles and runs one script written in a deterministic Python subset.
//! The script sees a small set of pure builtins, the `math` module, and
//! exactly one host capability: `submit_answers`, which records a fixed
//! number of values into a buffer the host inspects once the run ends.
//!
//! Nothing the script does can reach the file system, the network, the
//! process environment, the clock or a random source; such names simply do
//! not exist in its world. CPU and memory ceilings are not enforced here:
//! the worker process applies them around the whole run.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

mod ast;
mod builtins;
pub mod error;
mod interp;
mod lexer;
mod parser;
pub mod policy;
mod value;

pub use error::EngineError;
pub use parser::Program;

use gradebox_core::{Answer, SUBMIT_FUNCTION};
use tracing::debug;

use crate::interp::Interpreter;

/// Values recorded by the submit capability during one run.
///
/// Empty until the script makes its single permitted call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedAnswers(Vec<Answer>);

impl CapturedAnswers {
    pub(crate) fn new(answers: Vec<Answer>) -> Self {
        Self(answers)
    }

    /// `true` if the script never submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Answer] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<Answer> {
        self.0
    }
}

/// What a clean run leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// The submitted answers, if any.
    pub answers: CapturedAnswers,
    /// Everything the script printed, capped at
    /// [`policy::MAX_TRANSCRIPT_BYTES`].
    pub transcript: String,
}

/// Runs the front end only: tokenising, parsing and the subset policy.
///
/// # Errors
/// Returns [`EngineError::Compile`] for invalid or disallowed source.
pub fn compile(source: &str) -> Result<Program, EngineError> {
    parser::parse(source)
}

/// Compiles and runs `source` with a submit capability of `arity` values.
///
/// Identical `source` and `arity` always give an identical result.
///
/// # Errors
/// - [`EngineError::Compile`] if the source fails the front end; nothing ran.
/// - [`EngineError::Runtime`] if the script faulted.
/// - [`EngineError::Contract`] if the script called the capability with the
///   wrong number of values, or more than once.
pub fn run(source: &str, arity: usize) -> Result<Execution, EngineError> {
    let program = compile(source)?;
    debug!(statements = program.body.len(), arity, "program compiled");

    let mut interpreter = Interpreter::new(SUBMIT_FUNCTION, arity);
    let outcome = interpreter.run(&program);
    let (answers, transcript) = interpreter.into_parts();
    match &outcome {
        Ok(()) => debug!(submitted = !answers.is_empty(), transcript_bytes = transcript.len(), "program finished"),
        Err(e) => debug!(error = %e, "program faulted"),
    }
    outcome.map(|()| Execution { answers, transcript })
}
