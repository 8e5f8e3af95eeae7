//! TCP socket transport, e.g. a serial-to-network bridge

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use ubxflash_core::transport::{Transport, TransportError};

use crate::error::{Result, SerialError};
use crate::transport::{is_timeout, remaining, READ_CHUNK};

/// TCP socket transport
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to `host:port`
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        log::info!("tcp: connecting to {}", addr);

        let stream = TcpStream::connect(&addr)
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", addr, e)))?;

        stream.set_nodelay(true).map_err(|e| {
            SerialError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
        })?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;

        log::info!("tcp: connected to {}", addr);

        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        self.stream.write_all(data)?;
        Ok(())
    }

    fn receive(&mut self, deadline: Instant) -> std::result::Result<Vec<u8>, TransportError> {
        self.stream.set_read_timeout(Some(remaining(deadline)))?;

        let mut buf = vec![0u8; READ_CHUNK];
        match self.stream.read(&mut buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                buf.truncate(n);
                log::trace!("tcp: received {} bytes", n);
                Ok(buf)
            }
            Err(e) if is_timeout(&e) => Err(TransportError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> std::result::Result<(), TransportError> {
        self.stream.flush()?;
        Ok(())
    }

    fn clear(&mut self) -> std::result::Result<(), TransportError> {
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; READ_CHUNK];
        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Err(TransportError::Closed),
                Ok(n) => log::trace!("tcp: discarded {} stale bytes", n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e.into()),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }
}
