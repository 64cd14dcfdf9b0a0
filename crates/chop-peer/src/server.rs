use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chop_transport::{ChopListener, TransportError};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use crate::config::PeerConfig;
use crate::connection::{Connection, Phase};
use crate::error::Result;
use crate::event_loop::{service, Readiness, POLL_INTERVAL};
use crate::registry::{ConnectionRegistry, LISTENER};

const EVENTS_CAPACITY: usize = 128;

/// A text payload received by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub remote: SocketAddr,
    pub token: Token,
    pub payload: Bytes,
}

/// Bind a server on `addr`.
pub fn listen(addr: SocketAddr, config: PeerConfig) -> Result<Server> {
    config.frame.validate()?;

    let poll = Poll::new()?;
    let mut listener = ChopListener::bind(addr)?;
    poll.registry()
        .register(&mut listener, LISTENER, Interest::READABLE)?;

    Ok(Server {
        poll,
        events: Events::with_capacity(EVENTS_CAPACITY),
        listener,
        connections: ConnectionRegistry::new(config.max_connections),
        received: VecDeque::new(),
        config,
    })
}

/// Single-threaded server: one poll instance multiplexing the listener and
/// every accepted connection.
pub struct Server {
    poll: Poll,
    events: Events,
    listener: ChopListener,
    connections: ConnectionRegistry,
    received: VecDeque<Received>,
    config: PeerConfig,
}

impl Server {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Run forever.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.poll_once(None)?;
        }
    }

    /// Run until `stop` is set, then close every connection.
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Acquire) {
            self.poll_once(Some(POLL_INTERVAL))?;
        }
        self.close_all();
        Ok(())
    }

    /// Wait up to `timeout` for readiness and dispatch it.
    ///
    /// Returns the number of events handled.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(0),
            Err(err) => return Err(TransportError::Io(err).into()),
        }

        let ready: Vec<(Token, Readiness)> = self
            .events
            .iter()
            .map(|event| (event.token(), Readiness::from(event)))
            .collect();

        for (token, readiness) in &ready {
            if *token == LISTENER {
                self.accept_pending();
            } else {
                self.dispatch(*token, *readiness);
            }
        }
        Ok(ready.len())
    }

    /// Live connections.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|(_, conn)| Arc::clone(conn))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Text payloads received since the last call, in arrival order.
    ///
    /// Payloads that arrived just before a connection dropped are kept.
    pub fn take_received(&mut self) -> Vec<Received> {
        self.received.drain(..).collect()
    }

    fn accept_pending(&mut self) {
        loop {
            let (stream, remote) = match self.listener.accept() {
                Ok(Some(accepted)) => accepted,
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    return;
                }
            };

            if self.connections.is_full() {
                warn!(
                    %remote,
                    capacity = ?self.connections.capacity(),
                    "connection limit reached, closing"
                );
                if let Err(err) = stream.shutdown() {
                    debug!(%remote, error = %err, "shutdown of rejected socket failed");
                }
                continue;
            }

            if let Err(err) = stream.set_nodelay(true) {
                debug!(%remote, error = %err, "set_nodelay failed");
            }

            let conn = Arc::new(Connection::new(
                stream,
                remote,
                self.config.frame.clone(),
                Phase::Established,
            ));
            let token = match self.connections.insert(Arc::clone(&conn)) {
                Ok(token) => token,
                Err(err) => {
                    warn!(%remote, error = %err, "failed to register connection");
                    conn.mark_closed();
                    continue;
                }
            };
            if let Err(err) = conn.register(self.poll.registry(), token) {
                warn!(%remote, error = %err, "failed to watch connection");
                self.connections.remove(token);
                conn.mark_closed();
                continue;
            }

            info!(%remote, token = token.0, live = self.connections.len(), "client connected");
        }
    }

    fn dispatch(&mut self, token: Token, readiness: Readiness) {
        let Some(conn) = self.connections.get(token).cloned() else {
            return;
        };

        let outcome = service(&conn, readiness);
        while let Some(payload) = conn.receive() {
            self.received.push_back(Received {
                remote: conn.remote(),
                token,
                payload,
            });
        }
        // Nothing reads server-side notices; they are only logged.
        while let Some(notice) = conn.next_notice() {
            debug!(remote = %conn.remote(), ?notice, "notice");
        }

        match outcome {
            Ok(true) => {}
            Ok(false) => {
                info!(remote = %conn.remote(), "client disconnected");
                self.drop_connection(token);
            }
            Err(err) => {
                warn!(remote = %conn.remote(), error = %err, "connection fault, dropping");
                self.drop_connection(token);
            }
        }
    }

    fn drop_connection(&mut self, token: Token) {
        if let Some(conn) = self.connections.remove(token) {
            conn.deregister();
            conn.mark_closed();
        }
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.iter().map(|(token, _)| token).collect();
        for token in tokens {
            self.drop_connection(token);
        }
    }
}
