//! Non-blocking TCP transport for the Chop protocol.
//!
//! This is the lowest layer of chop. It wraps `mio` sockets so that the
//! same handle can be read, written and registered with a readiness
//! [`mio::Poll`] from the event loop, while other threads still hold a
//! shared handle for queueing writes.
//!
//! Unix only: registration goes through the raw file descriptor.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::ChopStream;
pub use tcp::ChopListener;
