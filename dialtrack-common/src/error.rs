//! Common error types for dialtrack

use thiserror::Error;

/// Common result type for dialtrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across dialtrack components
#[derive(Error, Debug)]
pub enum Error {
    /// A host capability is missing (secure random source, storage access)
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encode/decode error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry transmission failure
    #[error("Transmit error: {0}")]
    Transmit(String),
}
