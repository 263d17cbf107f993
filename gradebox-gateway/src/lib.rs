//! HTTP gateway for the gradebox evaluator.
//!
//! Exposes `evaluate` to the surrounding web application as one JSON
//! endpoint per exercise. The gateway only validates and forwards; every
//! submission is graded in its own sandbox worker.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod routes;

/// Environment variable holding the listen address.
pub const ENV_LISTEN_ADDR: &str = "GRADEBOX_LISTEN_ADDR";

/// Listen address used when [`ENV_LISTEN_ADDR`] is unset.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3457";
