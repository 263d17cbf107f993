//! Answers and the fixed submission arity.

/// One submitted or expected answer.
///
/// Any JSON value. Equality is structural and type-strict: `2 != 2.0`,
/// `true != 1`, and list order matters.
pub type Answer = serde_json::Value;

/// Number of values every submission call must carry.
pub const SUBMISSION_ARITY: usize = 3;

/// Name under which the submit capability is exposed to learner code.
pub const SUBMIT_FUNCTION: &str = "submit_answers";
