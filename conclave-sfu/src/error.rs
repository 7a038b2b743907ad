use thiserror::Error;

/// Failure reported by a media engine implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine refused the call (unknown handle, incompatible capabilities, ...)
    #[error("rejected: {0}")]
    Rejected(String),

    /// The engine could not be reached or is shutting down
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum SfuError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Engine {op} failed: {source}")]
    Engine {
        op: &'static str,
        #[source]
        source: EngineError,
    },

    #[error("Engine {op} timed out")]
    Timeout { op: &'static str },
}

impl SfuError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type Result<T> = std::result::Result<T, SfuError>;
