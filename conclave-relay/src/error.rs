use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Frame is neither a registration nor a forward")]
    UnrecognizedFrame,
}

pub type Result<T> = std::result::Result<T, RelayError>;
