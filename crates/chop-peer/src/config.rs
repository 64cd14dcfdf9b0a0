use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use chop_frame::FrameConfig;

/// Loopback endpoint used when no address is given.
pub const DEFAULT_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 50001));

/// Server connection bound used when none is given.
pub const DEFAULT_MAX_CONNECTIONS: usize = 20;

/// Peer behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// Window and payload limits for every connection.
    pub frame: FrameConfig,
    /// Server only. Connections accepted beyond this are closed at once.
    pub max_connections: Option<usize>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
        }
    }
}

impl PeerConfig {
    /// Default configuration with an explicit window.
    pub fn with_window(window: usize) -> crate::Result<Self> {
        Ok(Self {
            frame: FrameConfig::with_window(window)?,
            ..Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use chop_frame::FrameError;

    use super::*;
    use crate::PeerError;

    #[test]
    fn defaults() {
        let config = PeerConfig::default();
        assert_eq!(config.frame.window, 255);
        assert_eq!(config.max_connections, Some(20));
        assert_eq!(DEFAULT_ADDR.to_string(), "127.0.0.1:50001");
    }

    #[test]
    fn tiny_window_rejected() {
        let err = PeerConfig::with_window(2).unwrap_err();
        assert!(matches!(
            err,
            PeerError::Frame(FrameError::InvalidWindow { window: 2 })
        ));
    }
}
