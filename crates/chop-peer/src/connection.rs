use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use chop_frame::{
    encode_frame, status_name, Frame, FrameConfig, FrameError, FrameReader, FrameWriter, Header,
};
use chop_transport::ChopStream;
use mio::{Interest, Registry, Token};
use tracing::{debug, info, trace, warn};

use crate::error::{PeerError, Result};
use crate::flow::{Flow, FlowState};
use crate::notice::Notice;
use crate::protocol::{self, Action, Session};

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Non-blocking connect still in flight.
    Connecting,
    Established,
    /// `ESCAPE` sent, waiting for the acknowledgement.
    Closing,
    Closed,
}

/// Result of one [`Connection::read`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One frame was read and handled.
    Handled,
    /// No header was available.
    Idle,
    /// The connection is closed, either by the peer or by the handshake.
    Closed,
}

/// One Chop connection.
///
/// Shared between the event loop thread, which drives [`Connection::read`]
/// and [`Connection::write`] on readiness, and any number of application
/// threads calling [`Connection::send`] and the receive methods. Every
/// operation runs under a single lock, so frames on one connection are
/// handled strictly one at a time.
pub struct Connection {
    remote: SocketAddr,
    state: Mutex<State>,
    changed: Condvar,
}

struct State {
    stream: ChopStream,
    reader: FrameReader<ChopStream>,
    writer: FrameWriter<ChopStream>,
    config: FrameConfig,
    outbound: VecDeque<Bytes>,
    inbound: VecDeque<Bytes>,
    notices: VecDeque<Notice>,
    flow: Flow,
    phase: Phase,
    interest: Interest,
    registration: Option<(Registry, Token)>,
}

impl Connection {
    pub(crate) fn new(
        stream: ChopStream,
        remote: SocketAddr,
        config: FrameConfig,
        phase: Phase,
    ) -> Self {
        let reader = FrameReader::with_config(stream.clone(), config.clone());
        let writer = FrameWriter::with_config(stream.clone(), config.clone());
        let interest = match phase {
            Phase::Connecting => Interest::READABLE | Interest::WRITABLE,
            _ => Interest::READABLE,
        };

        Self {
            remote,
            state: Mutex::new(State {
                stream,
                reader,
                writer,
                config,
                outbound: VecDeque::new(),
                inbound: VecDeque::new(),
                notices: VecDeque::new(),
                flow: Flow::default(),
                phase,
                interest,
                registration: None,
            }),
            changed: Condvar::new(),
        }
    }

    /// Register the socket with a poll registry under `token`.
    pub(crate) fn register(&self, registry: &Registry, token: Token) -> Result<()> {
        let mut state = self.lock();
        let interest = state.interest;
        registry.register(&mut state.stream, token, interest)?;
        state.registration = Some((registry.try_clone()?, token));
        Ok(())
    }

    /// Remove the socket from its poll registry.
    pub(crate) fn deregister(&self) {
        let mut state = self.lock();
        if let Some((registry, _)) = state.registration.take() {
            if let Err(err) = registry.deregister(&mut state.stream) {
                debug!(remote = %self.remote, error = %err, "deregister failed");
            }
        }
    }

    /// Queue a frame for the event loop to write.
    pub fn send(&self, frame: Frame) -> Result<()> {
        let mut state = self.lock();
        state.ensure_sendable()?;

        if frame.body.len() > state.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.body.len(),
                max: state.config.max_payload_size,
            }
            .into());
        }

        let mut buf = BytesMut::with_capacity(frame.wire_size());
        encode_frame(&frame, &mut buf);
        debug!(
            remote = %self.remote,
            status = frame.header.status,
            name = status_name(frame.header.status),
            len = frame.body.len(),
            "frame queued"
        );
        state.enqueue(buf.freeze())
    }

    /// Queue raw, already-encoded frame bytes.
    ///
    /// Nothing is validated; the bytes go out exactly as given.
    pub fn send_bytes(&self, bytes: impl Into<Bytes>) -> Result<()> {
        let mut state = self.lock();
        state.ensure_sendable()?;
        state.enqueue(bytes.into())
    }

    /// Start the disconnect handshake by queueing `ESCAPE`.
    ///
    /// The connection closes once the peer acknowledges.
    pub fn request_escape(&self) -> Result<()> {
        let mut state = self.lock();
        state.ensure_sendable()?;
        state.enqueue(Frame::escape().to_bytes())?;
        state.phase = Phase::Closing;
        info!(remote = %self.remote, "disconnect requested");
        Ok(())
    }

    /// Pop the oldest received text payload.
    pub fn receive(&self) -> Option<Bytes> {
        self.lock().inbound.pop_front()
    }

    /// Wait for the next text payload.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Bytes> {
        self.wait_for(timeout, |state| match state.inbound.pop_front() {
            Some(payload) => Some(Ok(payload)),
            None if state.phase == Phase::Closed => Some(Err(PeerError::Closed)),
            None => None,
        })
    }

    /// Pop the oldest notice.
    pub fn next_notice(&self) -> Option<Notice> {
        self.lock().notices.pop_front()
    }

    /// Wait for the next notice.
    pub fn notice_timeout(&self, timeout: Duration) -> Result<Notice> {
        self.wait_for(timeout, |state| match state.notices.pop_front() {
            Some(notice) => Some(Ok(notice)),
            None if state.phase == Phase::Closed => Some(Err(PeerError::Closed)),
            None => None,
        })
    }

    /// Wait until the peer acknowledges or refuses `status`.
    ///
    /// Notices about other statuses are consumed and dropped.
    pub fn expect_ack(&self, status: impl Into<u8>, timeout: Duration) -> Result<()> {
        let status = status.into();
        self.wait_for(timeout, |state| {
            while let Some(notice) = state.notices.pop_front() {
                match notice {
                    Notice::Acknowledged(s) if s == status => return Some(Ok(())),
                    Notice::Refused(s) if s == status => {
                        return Some(Err(PeerError::Refused { status }))
                    }
                    other => trace!(?other, "skipping notice"),
                }
            }
            (state.phase == Phase::Closed).then_some(Err(PeerError::Closed))
        })
    }

    /// Wait until a pending connect completes.
    pub fn wait_established(&self, timeout: Duration) -> Result<()> {
        self.wait_for(timeout, |state| match state.phase {
            Phase::Connecting => None,
            Phase::Closed => Some(Err(PeerError::Closed)),
            Phase::Established | Phase::Closing => Some(Ok(())),
        })
    }

    /// Wait until the connection is closed.
    pub fn wait_closed(&self, timeout: Duration) -> Result<()> {
        self.wait_for(timeout, |state| (state.phase == Phase::Closed).then_some(Ok(())))
    }

    /// Close the socket immediately, without the disconnect handshake.
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.lock();
        self.close_locked(&mut state);
        Ok(())
    }

    /// Complete a non-blocking connect.
    ///
    /// Returns `Ok(false)` while the handshake is still in flight.
    pub fn establish(&self) -> Result<bool> {
        let mut state = self.lock();
        if state.phase != Phase::Connecting {
            return Ok(true);
        }

        match state.stream.finish_connect() {
            Ok(false) => Ok(false),
            Ok(true) => {
                if let Err(err) = state.stream.set_nodelay(true) {
                    debug!(remote = %self.remote, error = %err, "set_nodelay failed");
                }
                state.phase = Phase::Established;
                let interest = state.writable_interest();
                state.set_interest(interest)?;
                info!(remote = %self.remote, "connection established");
                self.changed.notify_all();
                Ok(true)
            }
            Err(err) => {
                self.close_locked(&mut state);
                Err(err.into())
            }
        }
    }

    /// Read and handle at most one frame.
    ///
    /// Any fault tears the connection down before it is returned.
    pub fn read(&self) -> Result<ReadOutcome> {
        let mut state = self.lock();
        if state.phase == Phase::Closed {
            return Ok(ReadOutcome::Closed);
        }

        let header = match state.reader.read_header() {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(ReadOutcome::Idle),
            Err(FrameError::ConnectionClosed) => {
                info!(remote = %self.remote, "peer disconnected");
                self.close_locked(&mut state);
                return Ok(ReadOutcome::Closed);
            }
            Err(err) => {
                self.close_locked(&mut state);
                return Err(err.into());
            }
        };

        self.log_header(&header);

        let (result, actions) = {
            let State {
                reader,
                flow,
                inbound,
                notices,
                ..
            } = &mut *state;
            let mut session = Session::new(reader, flow, inbound, notices, self.remote);
            let result = protocol::dispatch(&mut session, header);
            (result, session.into_actions())
        };

        if let Err(err) = result {
            self.close_locked(&mut state);
            return Err(err);
        }

        let mut closed = false;
        for action in actions {
            match action {
                Action::Queue(frame) => {
                    let mut buf = BytesMut::with_capacity(frame.wire_size());
                    encode_frame(&frame, &mut buf);
                    state.enqueue(buf.freeze())?;
                }
                Action::Flush(frame) => {
                    // Replies already queued go out first.
                    while let Some(bytes) = state.outbound.pop_front() {
                        if let Err(err) = state.writer.write_encoded(&bytes) {
                            warn!(
                                remote = %self.remote,
                                error = %err,
                                "failed to flush queued reply"
                            );
                            break;
                        }
                    }
                    if let Err(err) = state.writer.write_frame(&frame) {
                        warn!(remote = %self.remote, error = %err, "failed to flush reply");
                    }
                }
                Action::Close => {
                    self.close_locked(&mut state);
                    closed = true;
                }
            }
        }

        self.changed.notify_all();
        Ok(if closed {
            ReadOutcome::Closed
        } else {
            ReadOutcome::Handled
        })
    }

    /// Write the oldest queued frame.
    ///
    /// Returns `Ok(true)` if more frames remain queued. When the queue is
    /// empty the write interest is dropped.
    pub fn write(&self) -> Result<bool> {
        let mut state = self.lock();
        if matches!(state.phase, Phase::Connecting | Phase::Closed) {
            return Ok(false);
        }

        let Some(bytes) = state.outbound.pop_front() else {
            state.set_interest(Interest::READABLE)?;
            return Ok(false);
        };

        if let Err(err) = state.writer.write_encoded(&bytes) {
            self.close_locked(&mut state);
            return Err(err.into());
        }
        trace!(remote = %self.remote, len = bytes.len(), "frame written");

        if state.outbound.is_empty() {
            state.set_interest(Interest::READABLE)?;
            Ok(false)
        } else {
            Ok(true)
        }
    }

    /// Remote endpoint.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    pub fn flow(&self) -> Flow {
        self.lock().flow
    }

    pub fn incoming(&self) -> FlowState {
        self.flow().incoming
    }

    pub fn outgoing(&self) -> FlowState {
        self.flow().outgoing
    }

    /// Number of frames waiting to be written.
    pub fn pending_writes(&self) -> usize {
        self.lock().outbound.len()
    }

    /// Mark the connection closed after a fault seen outside `read`/`write`.
    pub(crate) fn mark_closed(&self) {
        let mut state = self.lock();
        self.close_locked(&mut state);
    }

    fn close_locked(&self, state: &mut State) {
        if state.phase == Phase::Closed {
            return;
        }
        state.phase = Phase::Closed;
        state.outbound.clear();
        if let Err(err) = state.stream.shutdown() {
            debug!(remote = %self.remote, error = %err, "socket shutdown failed");
        }
        debug!(remote = %self.remote, "connection closed");
        self.changed.notify_all();
    }

    fn log_header(&self, header: &Header) {
        debug!(
            remote = %self.remote,
            status = header.status,
            name = status_name(header.status),
            control1 = header.control1,
            control2 = header.control2,
            style = header.style(),
            "frame received"
        );
    }

    fn wait_for<T>(
        &self,
        timeout: Duration,
        mut ready: impl FnMut(&mut State) -> Option<Result<T>>,
    ) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(result) = ready(&mut *state) {
                return result;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PeerError::Timeout(timeout));
            }
            let (guard, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn ensure_sendable(&self) -> Result<()> {
        if matches!(self.phase, Phase::Closing | Phase::Closed)
            || self.flow.outgoing == FlowState::Cancelled
        {
            return Err(PeerError::Closed);
        }
        Ok(())
    }

    fn enqueue(&mut self, bytes: Bytes) -> Result<()> {
        self.outbound.push_back(bytes);
        if self.phase != Phase::Connecting {
            self.set_interest(Interest::READABLE | Interest::WRITABLE)?;
        }
        Ok(())
    }

    fn writable_interest(&self) -> Interest {
        if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    /// Re-arm the registration. Reregistering with write interest on a
    /// writable socket produces a fresh writable event.
    fn set_interest(&mut self, interest: Interest) -> Result<()> {
        let force = interest.is_writable();
        if self.interest == interest && !force {
            return Ok(());
        }
        self.interest = interest;
        if let Some((registry, token)) = &self.registration {
            registry.reregister(&mut self.stream, *token, interest)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("phase", &state.phase)
            .field("flow", &state.flow)
            .field("outbound", &state.outbound.len())
            .field("inbound", &state.inbound.len())
            .finish()
    }
}
