//! # Error Types
//!
//! Custom error types for WATTSCOPE Link using `thiserror`.

use thiserror::Error;

/// Main error type for WATTSCOPE Link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport (WebSocket) errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outbound frame could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(String),

    /// Inbound frame could not be decoded
    #[error("Malformed message: {0}")]
    Decode(String),

    /// Sensor reading or GPS fix failed validation
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    /// One-shot snapshot pull failed
    #[error("Snapshot pull failed: {0}")]
    Pull(String),

    /// The session event loop is no longer running
    #[error("Session closed")]
    SessionClosed,
}

/// Result type alias for WATTSCOPE Link
pub type Result<T> = std::result::Result<T, LinkError>;
