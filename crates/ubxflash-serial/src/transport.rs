//! Read helpers shared by the serial and TCP transports

use std::io;
use std::time::{Duration, Instant};

/// Receive buffer size per read call
pub(crate) const READ_CHUNK: usize = 4096;

/// Shortest wait handed to the OS, so that an expired deadline still polls
const MIN_WAIT: Duration = Duration::from_millis(1);

pub(crate) fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now()).max(MIN_WAIT)
}

pub(crate) fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
