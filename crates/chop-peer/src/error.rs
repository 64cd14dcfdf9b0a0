use std::time::Duration;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] chop_transport::TransportError),

    /// Frame-level error. The stream is desynchronized and the connection
    /// has been torn down.
    #[error("frame error: {0}")]
    Frame(#[from] chop_frame::FrameError),

    /// The peer answered `NEG_ACKNOWLEDGE` for a request we made.
    #[error("peer refused status {status}")]
    Refused { status: u8 },

    /// The connection is closing or closed and accepts no more frames.
    #[error("connection closed")]
    Closed,

    /// The server already holds its maximum number of connections.
    #[error("connection registry full ({capacity} connections)")]
    RegistryFull { capacity: usize },

    /// Waiting for a payload, notice or state change timed out.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl From<std::io::Error> for PeerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(chop_transport::TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
