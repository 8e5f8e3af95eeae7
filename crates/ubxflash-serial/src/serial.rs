//! Serial port transport

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use ubxflash_core::transport::{Transport, TransportError};

use crate::error::Result;
use crate::transport::{is_timeout, remaining, READ_CHUNK};

/// Default baud rate of the receiver's update port
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port (8N1, no flow control)
    pub fn open(device: &str, baud: Option<u32>) -> Result<Self> {
        let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

        let port = serialport::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_secs(1))
            .open()?;

        log::info!("serial: opened {} at {} baud", device, baud_rate);

        Ok(Self { port })
    }
}

fn io_error(e: serialport::Error) -> TransportError {
    TransportError::Io(e.into())
}

impl Transport for SerialTransport {
    fn send(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn receive(&mut self, deadline: Instant) -> std::result::Result<Vec<u8>, TransportError> {
        self.port.set_timeout(remaining(deadline)).map_err(io_error)?;

        let mut buf = vec![0u8; READ_CHUNK];
        match self.port.read(&mut buf) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => {
                buf.truncate(n);
                log::trace!("serial: received {} bytes", n);
                Ok(buf)
            }
            Err(e) if is_timeout(&e) => Err(TransportError::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> std::result::Result<(), TransportError> {
        self.port.flush()?;
        Ok(())
    }

    fn clear(&mut self) -> std::result::Result<(), TransportError> {
        self.port.clear(ClearBuffer::Input).map_err(io_error)
    }
}
