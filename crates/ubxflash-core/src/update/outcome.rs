//! Terminal result of an update session

use core::fmt;

use super::{AckState, Phase, ProgressReport};
use crate::error::{Error, Result};
use crate::transport::TransportError;

/// Where a session stopped
///
/// Everything written before this point is intact on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// State of the command in flight (or last completed)
    pub state: AckState,
    /// Phase of that command
    pub phase: Phase,
    /// Flash address of that command
    pub address: u32,
    /// Chunk index, if the command concerned one
    pub chunk: Option<usize>,
    /// Sector index, if the command concerned one
    pub sector: Option<usize>,
    /// Acknowledged chunks
    pub chunks_written: usize,
    /// Acknowledged sector erases
    pub sectors_erased: usize,
    /// Acknowledged bytes
    pub bytes_written: usize,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {} at 0x{:08X}",
            self.state, self.phase, self.address
        )?;
        if let Some(chunk) = self.chunk {
            write!(f, ", chunk {}", chunk)?;
        }
        if let Some(sector) = self.sector {
            write!(f, ", sector {}", sector)?;
        }
        write!(
            f,
            " ({} chunks / {} bytes written, {} sectors erased)",
            self.chunks_written, self.bytes_written, self.sectors_erased
        )
    }
}

/// Why a session failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The retry budget of a phase ran out
    RetryExhausted(Phase),
    /// The device refused to program a chunk
    WriteRejected,
    /// The device reported a checksum mismatch
    CrcMismatch,
    /// The transport failed
    Transport(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetryExhausted(phase) => write!(f, "retries exhausted during {}", phase),
            FailureReason::WriteRejected => write!(f, "write rejected, flash seems defective"),
            FailureReason::CrcMismatch => write!(f, "device checksum mismatch"),
            FailureReason::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

/// A failed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Cause
    pub reason: FailureReason,
    /// Position at failure
    pub snapshot: Snapshot,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; {}", self.reason, self.snapshot)
    }
}

/// Terminal outcome of an update session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Image written (and verified, if enabled)
    Success(ProgressReport),
    /// Stopped on request between commands
    Cancelled(Snapshot),
    /// Gave up
    Failed(Failure),
}

impl Outcome {
    /// Check for success
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Map onto the error taxonomy
    pub fn into_result(self) -> Result<ProgressReport> {
        match self {
            Outcome::Success(report) => Ok(report),
            Outcome::Cancelled(_) => Err(Error::Cancelled),
            Outcome::Failed(failure) => Err(match failure.reason {
                FailureReason::RetryExhausted(phase) => Error::RetryExhausted {
                    phase,
                    address: failure.snapshot.address,
                },
                FailureReason::WriteRejected => Error::FlashDefect {
                    address: failure.snapshot.address,
                },
                FailureReason::CrcMismatch => Error::CrcFailure,
                FailureReason::Transport(msg) => Error::Transport(TransportError::Other(msg)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            state: AckState::WriteSent,
            phase: Phase::Write,
            address: 0x0080_0600,
            chunk: Some(3),
            sector: Some(0),
            chunks_written: 3,
            sectors_erased: 2,
            bytes_written: 1536,
        }
    }

    #[test]
    fn test_into_result() {
        let failed = Outcome::Failed(Failure {
            reason: FailureReason::RetryExhausted(Phase::Write),
            snapshot: snapshot(),
        });
        assert!(matches!(
            failed.into_result(),
            Err(Error::RetryExhausted {
                phase: Phase::Write,
                address: 0x0080_0600
            })
        ));

        assert!(matches!(
            Outcome::Cancelled(snapshot()).into_result(),
            Err(Error::Cancelled)
        ));

        let crc = Outcome::Failed(Failure {
            reason: FailureReason::CrcMismatch,
            snapshot: snapshot(),
        });
        assert!(matches!(crc.into_result(), Err(Error::CrcFailure)));

        let rejected = Outcome::Failed(Failure {
            reason: FailureReason::WriteRejected,
            snapshot: snapshot(),
        });
        assert!(matches!(
            rejected.into_result(),
            Err(Error::FlashDefect {
                address: 0x0080_0600
            })
        ));
    }

    #[test]
    fn test_snapshot_display() {
        let text = snapshot().to_string();
        assert!(text.contains("write sent in write at 0x00800600"));
        assert!(text.contains("chunk 3"));
        assert!(text.contains("3 chunks / 1536 bytes written"));
    }
}
