//! Core error types

use thiserror::Error;

/// Errors raised by the value codec and the secret cipher
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unsupported value for serialization: {0}")]
    Serialization(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
