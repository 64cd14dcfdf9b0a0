//! Chop connections and the readiness-driven engine that runs them.
//!
//! A [`Server`] multiplexes a listener and every accepted [`Connection`] on
//! one thread. A [`Client`] drives a single connection from a background
//! thread while the application sends frames and waits for payloads and
//! [`Notice`]s through the shared connection handle.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use chop_frame::{Frame, Status};
//! use chop_peer::{connect, PeerConfig, DEFAULT_ADDR};
//!
//! # fn main() -> chop_peer::Result<()> {
//! let client = connect(DEFAULT_ADDR, PeerConfig::default())?;
//! client.wait_established(Duration::from_secs(5))?;
//! client.send(Frame::text(&b"hello"[..])?)?;
//! client.expect_ack(Status::StartText, Duration::from_secs(5))?;
//! client.close()
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_loop;
pub mod flow;
pub mod notice;
pub mod protocol;
pub mod registry;
pub mod server;

pub use client::{connect, Client};
pub use config::{PeerConfig, DEFAULT_ADDR, DEFAULT_MAX_CONNECTIONS};
pub use connection::{Connection, Phase, ReadOutcome};
pub use error::{PeerError, Result};
pub use flow::{Flow, FlowState};
pub use notice::Notice;
pub use protocol::unix_millis;
pub use registry::ConnectionRegistry;
pub use server::{listen, Received, Server};
