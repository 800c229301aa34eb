//! State store error types

use thiserror::Error;

/// State store errors
///
/// `Unavailable` and `Io` are retryable by the caller; the engine
/// deliberately does not retry them itself so a persistent backend
/// outage stays visible.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid state record: {0}")]
    InvalidRecord(#[from] serde_json::Error),

    #[error("invalid store key: {0}")]
    InvalidKey(String),

    #[error("unauthorized: the state store rejected the supplied credentials")]
    Unauthorized,
}

pub type Result<T> = std::result::Result<T, StateError>;
