//! Error types for opening links

use thiserror::Error;

/// Errors opening a serial or TCP link
#[derive(Debug, Error)]
pub enum SerialError {
    /// Failed to connect to the receiver
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Malformed connection string
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for link setup
pub type Result<T> = std::result::Result<T, SerialError>;
