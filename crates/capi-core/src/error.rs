use thiserror::Error;

/// Errors produced by terminal sessions, the bridge transport and the tool layer.
#[derive(Debug, Error)]
pub enum CapiError {
    #[error("terminal not found: {0}")]
    SessionNotFound(String),

    #[error("terminal already exists: {0}")]
    SessionExists(String),

    #[error("failed to spawn terminal: {0}")]
    Spawn(String),

    #[error("pty error: {0}")]
    Pty(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CapiError {
    fn from(e: serde_json::Error) -> Self {
        CapiError::Decode(e.to_string())
    }
}

pub type CapiResult<T> = Result<T, CapiError>;
