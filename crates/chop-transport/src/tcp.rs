use std::io::ErrorKind;
use std::net::SocketAddr;

use mio::event::Source;
use mio::net::TcpListener;
use mio::{Interest, Registry, Token};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::ChopStream;

/// Non-blocking TCP listener for the server role.
///
/// Register it for readable readiness; every readable event may carry
/// several pending connections, so drain [`ChopListener::accept`] until it
/// returns `Ok(None)`.
pub struct ChopListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl ChopListener {
    /// Bind and listen on `addr`.
    ///
    /// Port 0 picks an ephemeral port; read it back with
    /// [`ChopListener::local_addr`].
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%addr, "listening for chop connections");

        Ok(Self { listener, addr })
    }

    /// Accept one pending connection.
    ///
    /// Returns `Ok(None)` when no connection is waiting.
    pub fn accept(&self) -> Result<Option<(ChopStream, SocketAddr)>> {
        loop {
            match self.listener.accept() {
                Ok((stream, remote)) => {
                    debug!(%remote, "accepted connection");
                    return Ok(Some((ChopStream::from_mio(stream), remote)));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Source for ChopListener {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> std::io::Result<()> {
        self.listener.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> std::io::Result<()> {
        self.listener.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.listener.deregister(registry)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::time::{Duration, Instant};

    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn accept_within(listener: &ChopListener, timeout: Duration) -> (ChopStream, SocketAddr) {
        let start = Instant::now();
        loop {
            if let Some(accepted) = listener.accept().unwrap() {
                return accepted;
            }
            assert!(start.elapsed() < timeout, "no connection accepted");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn connected_within(stream: &ChopStream, timeout: Duration) {
        let start = Instant::now();
        while !stream.finish_connect().unwrap() {
            assert!(start.elapsed() < timeout, "connect did not complete");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_bind_reports_ephemeral_port() {
        let listener = ChopListener::bind(loopback()).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[test]
    fn test_accept_without_pending_returns_none() {
        let listener = ChopListener::bind(loopback()).unwrap();
        assert!(listener.accept().unwrap().is_none());
    }

    #[test]
    fn test_bind_accept_connect() {
        let listener = ChopListener::bind(loopback()).unwrap();
        let mut client = ChopStream::connect(listener.local_addr()).unwrap();
        let (mut server, remote) = accept_within(&listener, Duration::from_secs(2));
        connected_within(&client, Duration::from_secs(2));

        assert_eq!(remote, client.local_addr().unwrap());

        client.write_all(&[0, 5, 0, 0]).unwrap();

        let mut buf = [0u8; 4];
        let mut got = 0;
        let start = Instant::now();
        while got < buf.len() {
            match server.read(&mut buf[got..]) {
                Ok(n) => got += n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    assert!(start.elapsed() < Duration::from_secs(2));
                    std::thread::yield_now();
                }
                Err(err) => panic!("read failed: {err}"),
            }
        }
        assert_eq!(buf, [0, 5, 0, 0]);
    }

    #[test]
    fn test_clones_share_socket() {
        let listener = ChopListener::bind(loopback()).unwrap();
        let client = ChopStream::connect(listener.local_addr()).unwrap();
        let (_server, _) = accept_within(&listener, Duration::from_secs(2));
        connected_within(&client, Duration::from_secs(2));

        let shared = client.clone();
        assert_eq!(shared.as_raw_fd(), client.as_raw_fd());
        assert_eq!(shared.local_addr().unwrap(), client.local_addr().unwrap());
    }

    #[test]
    fn test_connect_refused_surfaces_error() {
        // Bind then drop to get a port with nothing listening.
        let addr = {
            let listener = ChopListener::bind(loopback()).unwrap();
            listener.local_addr()
        };

        let stream = match ChopStream::connect(addr) {
            Ok(stream) => stream,
            Err(TransportError::Connect { .. }) => return,
            Err(other) => panic!("unexpected error: {other}"),
        };

        let start = Instant::now();
        loop {
            match stream.finish_connect() {
                Err(_) => return,
                Ok(true) => panic!("connect to closed port succeeded"),
                Ok(false) => {
                    assert!(start.elapsed() < Duration::from_secs(2));
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let listener = ChopListener::bind(loopback()).unwrap();
        let client = ChopStream::connect(listener.local_addr()).unwrap();
        let (_server, _) = accept_within(&listener, Duration::from_secs(2));
        connected_within(&client, Duration::from_secs(2));

        client.shutdown().unwrap();
        client.shutdown().unwrap();
    }
}
