use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chop_transport::{ChopStream, TransportError};
use mio::{Events, Poll, Token};
use tracing::{debug, warn};

use crate::config::PeerConfig;
use crate::connection::{Connection, Phase};
use crate::error::{PeerError, Result};
use crate::event_loop::{service, Readiness, POLL_INTERVAL};

const CLIENT: Token = Token(1);

/// Start a non-blocking connect to `addr` and run its event loop on a
/// dedicated thread.
///
/// The returned client is usable at once; frames sent before the connect
/// completes are written as soon as it does.
pub fn connect(addr: SocketAddr, config: PeerConfig) -> Result<Client> {
    config.frame.validate()?;

    let poll = Poll::new()?;
    let stream = ChopStream::connect(addr)?;
    let connection = Arc::new(Connection::new(
        stream,
        addr,
        config.frame,
        Phase::Connecting,
    ));
    connection.register(poll.registry(), CLIENT)?;

    let stop = Arc::new(AtomicBool::new(false));
    let thread = {
        let connection = Arc::clone(&connection);
        let stop = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("chop-client".to_string())
            .spawn(move || run(poll, &connection, &stop))
            .map_err(TransportError::Io)?
    };

    Ok(Client {
        connection,
        stop,
        thread: Some(thread),
    })
}

/// Client role: one connection driven by a background loop.
pub struct Client {
    connection: Arc<Connection>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl Client {
    /// Shared handle to the connection.
    pub fn connection(&self) -> Arc<Connection> {
        Arc::clone(&self.connection)
    }

    /// Stop the loop, close the socket and return the loop's result.
    pub fn close(mut self) -> Result<()> {
        self.stop_and_join()
    }

    /// Wait for the loop to end on its own (after `ESCAPE` or a fault).
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or(Err(PeerError::Closed)),
            None => Ok(()),
        }
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        self.connection.mark_closed();
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or(Err(PeerError::Closed)),
            None => Ok(()),
        }
    }
}

impl std::ops::Deref for Client {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_join() {
            debug!(error = %err, "client loop ended with error");
        }
    }
}

fn run(mut poll: Poll, connection: &Connection, stop: &AtomicBool) -> Result<()> {
    let mut events = Events::with_capacity(16);
    let result = drive(&mut poll, &mut events, connection, stop);
    if let Err(err) = &result {
        warn!(remote = %connection.remote(), error = %err, "client connection fault");
    }
    connection.deregister();
    connection.mark_closed();
    result
}

fn drive(
    poll: &mut Poll,
    events: &mut Events,
    connection: &Connection,
    stop: &AtomicBool,
) -> Result<()> {
    while !stop.load(Ordering::Acquire) && !connection.is_closed() {
        match poll.poll(events, Some(POLL_INTERVAL)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err).into()),
        }

        for event in events.iter() {
            if event.token() != CLIENT {
                continue;
            }
            if !service(connection, Readiness::from(event))? {
                debug!(remote = %connection.remote(), "client loop finished");
                return Ok(());
            }
        }
    }
    Ok(())
}
