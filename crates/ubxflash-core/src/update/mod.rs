//! Flash update engine
//!
//! [`UpdateSession`] drives the erase/write/verify exchange with a receiver
//! over any [`Transport`](crate::transport::Transport):
//!
//! 1. Sectors are erased in increasing order, at most
//!    `max_pending_erases` ahead of the writes (or all at once with a chip
//!    erase).
//! 2. Chunks are written in increasing address order, each only after its
//!    sector has been acknowledged as erased.
//! 3. The device is asked to verify the Fletcher-32 of the whole image.
//!
//! Exactly one command is outstanding at a time. Timeouts and negative
//! acknowledgments are retried within the budget of the phase; the session
//! ends with an [`Outcome`].

mod config;
mod geometry;
mod outcome;
mod progress;
mod session;

pub use config::UpdateConfig;
pub use geometry::FlashGeometry;
pub use outcome::{Failure, FailureReason, Outcome, Snapshot};
pub use progress::{NoProgress, ProgressReport, ProgressThrottle, UpdateProgress};
pub use session::{CancelToken, UpdateSession};

use core::fmt;

/// Protocol phase of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Whole-chip erase
    ChipErase,
    /// Sector erase
    Erase,
    /// Chunk write
    Write,
    /// Final checksum poll
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::ChipErase => write!(f, "chip erase"),
            Phase::Erase => write!(f, "erase"),
            Phase::Write => write!(f, "write"),
            Phase::Verify => write!(f, "verify"),
        }
    }
}

/// Acknowledgment state of a chunk
///
/// `Init` is the state before anything was sent for the chunk; `Failed`
/// marks the chunk whose command exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AckState {
    /// Nothing sent yet
    #[default]
    Init,
    /// Sector erase sent, no acknowledgment yet
    EraseSent,
    /// Sector erased
    EraseAcked,
    /// Chunk write sent, no acknowledgment yet
    WriteSent,
    /// Chunk written
    WriteAcked,
    /// Gave up on this chunk
    Failed,
}

impl AckState {
    /// One-character form used in trace state maps
    pub fn symbol(self) -> char {
        match self {
            AckState::Init => '.',
            AckState::EraseSent => 'e',
            AckState::EraseAcked => 'E',
            AckState::WriteSent => 'w',
            AckState::WriteAcked => 'W',
            AckState::Failed => '!',
        }
    }
}

impl fmt::Display for AckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AckState::Init => "init",
            AckState::EraseSent => "erase sent",
            AckState::EraseAcked => "erase acked",
            AckState::WriteSent => "write sent",
            AckState::WriteAcked => "write acked",
            AckState::Failed => "failed",
        };
        f.write_str(name)
    }
}
