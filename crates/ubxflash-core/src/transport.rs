//! Transport contract consumed by the update session
//!
//! A transport moves raw bytes to and from the receiver. Framing is done by
//! the caller; a transport only guarantees that bytes written by `send` are
//! delivered in order and that `receive` never blocks past its deadline.

use std::io;
use std::time::Instant;

use thiserror::Error;

/// Transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// No data before the deadline
    #[error("Timeout")]
    Timeout,

    /// The link was closed by the peer
    #[error("Connection closed")]
    Closed,

    /// I/O error on the underlying device
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any other failure
    #[error("{0}")]
    Other(String),
}

/// Byte-level link to the receiver
pub trait Transport {
    /// Write all of `data`
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Wait for data until `deadline`
    ///
    /// Returns whatever bytes are available, at least one, or
    /// [`TransportError::Timeout`] once the deadline has passed.
    fn receive(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError>;

    /// Push out buffered output
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Discard pending input
    fn clear(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).send(data)
    }

    fn receive(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        (**self).receive(deadline)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        (**self).clear()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).send(data)
    }

    fn receive(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        (**self).receive(deadline)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        (**self).clear()
    }
}
