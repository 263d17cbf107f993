//! Evaluation orchestrator for the gradebox sandbox.
//!
//! Spawns one isolated worker process per submission, enforces the
//! wall-clock deadline, and validates the worker's single verdict message.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod config;
pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod process;
pub mod runner;

pub use backend::WorkerBackend;
pub use config::EvaluatorConfig;
pub use error::ExecutorError;
pub use handle::WorkerHandle;
pub use orchestrator::{evaluate_submission, Evaluator};
pub use process::ProcessBackend;
pub use runner::{SubmissionRunner, WorkerOutput};
