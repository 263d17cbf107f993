//! Sandbox worker for gradebox.
//!
//! A worker is a short-lived process that grades exactly one submission:
//!
//! ```text
//! Start -> LimitsApplied -> KeyLoaded -> Executing -> Verdicted -> Exit
//! ```
//!
//! It reads one request from stdin, lowers its own resource ceilings, loads
//! the answer keys, runs the submission in the restricted engine and writes
//! a single verdict line to stdout. Logs go to stderr only.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod limits;
pub mod pipeline;
pub mod settings;

pub use limits::{LimitReport, WorkerLimits};
pub use settings::WorkerSettings;

/// Exit code when the request payload could not be parsed.
pub const EXIT_INVALID_REQUEST: u8 = 1;

/// Exit code when the worker could not produce any verdict at all.
pub const EXIT_INFRASTRUCTURE: u8 = 2;
