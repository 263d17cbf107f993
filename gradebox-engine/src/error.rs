//! Error types for the engine crate.

/// Why a script could not produce captured answers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The script is not valid source or breaks the restricted-subset policy.
    /// Nothing was executed.
    #[error("line {line}: {message}")]
    Compile { line: usize, message: String },

    /// The script faulted while running.
    #[error("line {line}: {message}")]
    Runtime { line: usize, message: String },

    /// The submit capability was called with the wrong number of values, or
    /// more than once.
    #[error("{0}")]
    Contract(String),
}

impl EngineError {
    pub(crate) fn compile(line: usize, message: impl Into<String>) -> Self {
        Self::Compile { line, message: message.into() }
    }

    /// A runtime fault whose line is filled in by the enclosing statement.
    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime { line: 0, message: message.into() }
    }

    /// Attaches `line` to a runtime fault that does not have one yet.
    #[must_use]
    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            Self::Runtime { line: 0, message } => Self::Runtime { line, message },
            other => other,
        }
    }
}

/// Shorthand used throughout the interpreter.
pub(crate) type EngineResult<T> = Result<T, EngineError>;
