use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use tracing::debug;

use crate::error::{Result, TransportError};

/// A non-blocking TCP stream carrying Chop frames. Implements `Read` and `Write`.
///
/// Clones share the same socket, so the reader and writer halves of a
/// connection (and its readiness registration) all refer to one descriptor.
/// Reads and writes never block: an empty socket yields
/// [`ErrorKind::WouldBlock`] and callers decide whether to spin or yield.
#[derive(Clone)]
pub struct ChopStream {
    inner: Arc<mio::net::TcpStream>,
}

impl Read for ChopStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (&*self.inner).read(buf)
    }
}

impl Write for ChopStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (&*self.inner).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (&*self.inner).flush()
    }
}

impl ChopStream {
    /// Wrap an already-created mio stream.
    pub fn from_mio(stream: mio::net::TcpStream) -> Self {
        Self {
            inner: Arc::new(stream),
        }
    }

    /// Start a non-blocking connect to `addr`.
    ///
    /// The returned stream is usually still connecting; register it for
    /// writable readiness and call [`ChopStream::finish_connect`] when the
    /// event fires.
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = mio::net::TcpStream::connect(addr)
            .map_err(|source| TransportError::Connect { addr, source })?;
        debug!(%addr, "connect started");
        Ok(Self::from_mio(stream))
    }

    /// Check whether a pending non-blocking connect has completed.
    ///
    /// Returns `Ok(false)` while the handshake is still in flight and an
    /// error if the connect was refused or otherwise failed.
    pub fn finish_connect(&self) -> Result<bool> {
        if let Some(err) = self.inner.take_error()? {
            return Err(TransportError::Io(err));
        }

        match self.inner.peer_addr() {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(false),
            Err(err) if err.raw_os_error() == Some(libc::EINPROGRESS) => Ok(false),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Local address of this socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Disable Nagle's algorithm; frames are small and latency-bound.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Shut down both directions of the socket.
    ///
    /// A socket that is already disconnected is not an error.
    pub fn shutdown(&self) -> Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl AsRawFd for ChopStream {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl Source for ChopStream {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> std::io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> std::io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).deregister(registry)
    }
}

impl std::fmt::Debug for ChopStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChopStream")
            .field("fd", &self.inner.as_raw_fd())
            .field("peer", &self.inner.peer_addr().ok())
            .finish()
    }
}
