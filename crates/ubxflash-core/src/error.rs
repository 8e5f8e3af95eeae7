//! Error types for ubxflash-core
//!
//! One error enum covers catalog loading, image merging and the update
//! session. Transports report [`TransportError`], which converts into
//! [`Error::Transport`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::JedecId;
use crate::transport::TransportError;
use crate::update::Phase;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Source image, catalog or config file could not be read
    #[error("Cannot read {}: {source}", path.display())]
    FileNotFound {
        /// Path that was opened
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Catalog or image format version not supported by this build
    #[error("Unsupported format version: {0}")]
    VersionError(String),

    /// Malformed catalog document (missing or invalid fields)
    #[error("Incorrect XML: {0}")]
    IncorrectXml(String),

    /// No catalog entry for the requested JEDEC ID
    #[error("Flash {0} not supported by catalog")]
    JedecNotSupported(JedecId),

    /// Structurally invalid image, FIS record or command set code
    #[error("Code corrupted: {0}")]
    CodeCorrupted(String),

    /// Checksum mismatch after stamping or after flashing
    #[error("CRC failure")]
    CrcFailure,

    /// Transport send/receive failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Retry budget of a phase exhausted
    #[error("Retries exhausted during {phase} at 0x{address:08X}")]
    RetryExhausted {
        /// Phase that gave up
        phase: Phase,
        /// Flash address in progress
        address: u32,
    },

    /// The receiver refused to program a chunk
    #[error("Flash write rejected at 0x{address:08X}, flash seems defective")]
    FlashDefect {
        /// Flash address of the rejected chunk
        address: u32,
    },

    /// Update session aborted by the caller
    #[error("Update cancelled")]
    Cancelled,

    /// Invalid update configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal fault
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Result type alias for core operations
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Build a `FileNotFound` error for `path`
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::FileNotFound {
            path: path.into(),
            source,
        }
    }

    /// Build an `IncorrectXml` error
    pub fn xml(msg: impl Into<String>) -> Self {
        Error::IncorrectXml(msg.into())
    }

    /// Build a `CodeCorrupted` error
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Error::CodeCorrupted(msg.into())
    }
}
