//! Error types for the Spool engine

use thiserror::Error;

/// Engine error type
///
/// Control-path operations reject bad input before any state change;
/// the audio path never surfaces these (it substitutes silence instead).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Shorthand for an `InvalidArgument` with a formatted message
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
