//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.
//! Every preprocessing failure is scoped to the single call that produced it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to read image source: {0}")]
    Read(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to create drawing surface: {0}")]
    Surface(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("S3/storage error: {0}")]
    S3(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
