//! Readiness dispatch shared by the server and client loops.
//!
//! Sockets are registered edge-triggered, so every readable event drains
//! frames until the socket would block and every writable event drains the
//! outbound queue.

use std::time::Duration;

use mio::event::Event;

use crate::connection::{Connection, Phase, ReadOutcome};
use crate::error::Result;

/// Poll timeout used when a loop also has to watch a stop flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Readiness reported for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl From<&Event> for Readiness {
    fn from(event: &Event) -> Self {
        Self {
            readable: event.is_readable() || event.is_read_closed() || event.is_error(),
            writable: event.is_writable() || event.is_write_closed(),
        }
    }
}

/// Drive one connection after a readiness event.
///
/// Returns `Ok(false)` once the connection is closed and should be
/// dropped. Errors are faults; the connection is already torn down.
pub fn service(connection: &Connection, readiness: Readiness) -> Result<bool> {
    if connection.phase() == Phase::Connecting {
        if !(readiness.writable || readiness.readable) || !connection.establish()? {
            return Ok(true);
        }
    }

    if readiness.readable {
        loop {
            match connection.read()? {
                ReadOutcome::Handled => continue,
                ReadOutcome::Idle => break,
                ReadOutcome::Closed => return Ok(false),
            }
        }
    }

    if readiness.writable || connection.pending_writes() > 0 {
        while connection.write()? {}
    }

    Ok(!connection.is_closed())
}
