//! ubxflash-serial - links to a receiver
//!
//! Implements [`ubxflash_core::transport::Transport`] over a serial port
//! and over a TCP socket.
//!
//! # Example
//!
//! ```no_run
//! use ubxflash_serial::Connection;
//!
//! let conn = Connection::parse("dev=/dev/ttyACM0:921600")?;
//! let transport = conn.open()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod serial;
pub mod tcp;
mod transport;

pub use error::{Result, SerialError};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use ubxflash_core::transport::Transport;

/// Where the receiver is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    /// Serial port connection
    Serial {
        /// Device path (e.g., "/dev/ttyACM0" or "COM3")
        device: String,
        /// Baud rate (None for the default)
        baud: Option<u32>,
    },
    /// TCP socket connection
    Tcp {
        /// Hostname or IP address
        host: String,
        /// Port number
        port: u16,
    },
}

impl Connection {
    /// Parse a connection string
    ///
    /// Formats:
    /// - `dev=/dev/ttyACM0` - Serial with default baud
    /// - `dev=/dev/ttyACM0:921600` - Serial with specified baud
    /// - `ip=host:port` - TCP connection
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(dev) = s.strip_prefix("dev=") {
            Self::serial(dev)
        } else if let Some(ip) = s.strip_prefix("ip=") {
            Self::tcp(ip)
        } else {
            Err(SerialError::InvalidParameter(format!(
                "invalid connection string: {}. Use dev=... or ip=...",
                s
            )))
        }
    }

    /// Parse `device[:baud]`
    pub fn serial(s: &str) -> Result<Self> {
        match s.rsplit_once(':') {
            Some((device, baud_str)) if !device.is_empty() => {
                let baud = baud_str
                    .parse()
                    .map_err(|_| SerialError::InvalidParameter(format!("invalid baud rate: {}", baud_str)))?;
                Ok(Connection::Serial {
                    device: device.to_string(),
                    baud: Some(baud),
                })
            }
            _ => Ok(Connection::Serial {
                device: s.to_string(),
                baud: None,
            }),
        }
    }

    /// Parse `host:port`
    pub fn tcp(s: &str) -> Result<Self> {
        let (host, port_str) = s
            .rsplit_once(':')
            .ok_or_else(|| SerialError::InvalidParameter("missing port in host:port".into()))?;
        let port = port_str
            .parse()
            .map_err(|_| SerialError::InvalidParameter(format!("invalid port: {}", port_str)))?;
        Ok(Connection::Tcp {
            host: host.to_string(),
            port,
        })
    }

    /// Open the link
    pub fn open(&self) -> Result<Box<dyn Transport + Send>> {
        match self {
            Connection::Serial { device, baud } => {
                Ok(Box::new(SerialTransport::open(device, *baud)?))
            }
            Connection::Tcp { host, port } => Ok(Box::new(TcpTransport::connect(host, *port)?)),
        }
    }
}
