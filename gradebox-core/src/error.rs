use std::path::PathBuf;

/// Errors produced by the `gradebox-core` crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// An exercise identifier did not match the normalised format.
    #[error("invalid exercise id '{id}': {reason}")]
    InvalidExerciseId { id: String, reason: String },

    /// The answer-key source could not be read.
    #[error("answer keys unavailable at {path}: {source}")]
    AnswerKeysUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The answer-key source was readable but not valid.
    #[error("answer keys are corrupt: {reason}")]
    AnswerKeysCorrupt { reason: String },

    /// A sandbox limit combination was rejected.
    #[error("invalid sandbox limits: {reason}")]
    InvalidLimits { reason: String },
}
