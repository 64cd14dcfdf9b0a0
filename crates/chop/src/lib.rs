//! Chop: a small binary application protocol over TCP.
//!
//! Every message is a 4-byte header, optionally followed by a body whose
//! size is derived from the header. Peers exchange text, pings, a two-phase
//! sleep/wake handshake and a disconnect handshake, and move every body in
//! fixed-size window segments.
//!
//! # Crate Structure
//!
//! - [`transport`]: non-blocking TCP handles registrable with `mio`
//! - [`frame`]: header codec, status codes and windowed reader/writer
//! - [`peer`]: connections, protocol state machine, server and client loops

/// Re-export transport types.
pub mod transport {
    pub use chop_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chop_frame::*;
}

/// Re-export peer types.
pub mod peer {
    pub use chop_peer::*;
}
