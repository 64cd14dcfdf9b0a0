//! Status dispatch.
//!
//! Each inbound header is routed through a table keyed by its status byte.
//! A handler reads whatever body the header declares, updates connection
//! state, and records the replies it wants sent as [`Action`]s. Statuses
//! without a handler are refused with `NEG_ACKNOWLEDGE`.

use std::collections::VecDeque;
use std::io::Read;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use chop_frame::{status_name, Enquiry, Frame, FrameReader, Header, Status};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::flow::Flow;
use crate::notice::Notice;

/// What the connection must do after a handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Append to the outbound queue.
    Queue(Frame),
    /// Write immediately, ahead of anything queued.
    Flush(Frame),
    /// Tear the connection down.
    Close,
}

/// The slice of connection state a handler may touch.
pub struct Session<'a, R> {
    pub reader: &'a mut FrameReader<R>,
    pub flow: &'a mut Flow,
    pub inbound: &'a mut VecDeque<Bytes>,
    pub notices: &'a mut VecDeque<Notice>,
    pub remote: SocketAddr,
    actions: Vec<Action>,
}

impl<'a, R: Read> Session<'a, R> {
    pub fn new(
        reader: &'a mut FrameReader<R>,
        flow: &'a mut Flow,
        inbound: &'a mut VecDeque<Bytes>,
        notices: &'a mut VecDeque<Notice>,
        remote: SocketAddr,
    ) -> Self {
        Self {
            reader,
            flow,
            inbound,
            notices,
            remote,
            actions: Vec::new(),
        }
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }

    fn reply(&mut self, frame: Frame) {
        self.actions.push(Action::Queue(frame));
    }
}

pub type Handler<R> = fn(&mut Session<'_, R>, Header) -> Result<()>;

/// Handler for a status byte, if one is registered.
pub fn handler_for<R: Read>(status: u8) -> Option<Handler<R>> {
    let handler: Handler<R> = match Status::from_byte(status)? {
        Status::Null => handle_null,
        Status::StartText => handle_start_text,
        Status::Enquiry => handle_enquiry,
        Status::Acknowledge => handle_acknowledge,
        Status::NegAcknowledge => handle_neg_acknowledge,
        Status::Idle => handle_idle,
        Status::Wakeup => handle_wakeup,
        Status::Escape => handle_escape,
        Status::StartHeader | Status::EndText | Status::Cancel => return None,
    };
    Some(handler)
}

/// Route one header to its handler.
///
/// Only body-read faults are returned as errors; those leave the stream
/// desynchronized.
pub fn dispatch<R: Read>(session: &mut Session<'_, R>, header: Header) -> Result<()> {
    match handler_for::<R>(header.status) {
        Some(handler) => handler(session, header),
        None => {
            warn!(
                remote = %session.remote,
                status = header.status,
                name = status_name(header.status),
                "no handler for status, refusing"
            );
            session.reply(Frame::refuse(header.status));
            Ok(())
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

fn handle_null<R: Read>(_session: &mut Session<'_, R>, _header: Header) -> Result<()> {
    Ok(())
}

fn handle_start_text<R: Read>(session: &mut Session<'_, R>, header: Header) -> Result<()> {
    let body = session.reader.read_body(&header)?;
    debug!(remote = %session.remote, len = body.len(), "text received");
    session.inbound.push_back(body);
    session.reply(Frame::acknowledge(Status::StartText));
    Ok(())
}

fn handle_enquiry<R: Read>(session: &mut Session<'_, R>, header: Header) -> Result<()> {
    let Some(kind) = Enquiry::from_byte(header.control1) else {
        warn!(remote = %session.remote, kind = header.control1, "unknown enquiry type");
        session.reply(Frame::refuse(Status::Enquiry));
        return Ok(());
    };

    debug!(remote = %session.remote, ?kind, "enquiry received");
    match kind {
        Enquiry::Normal => session.reply(Frame::acknowledge(Status::Enquiry)),
        Enquiry::Return => session.reply(Frame::enquiry(Enquiry::Normal)),
        Enquiry::Time => {
            let body = session.reader.read_body(&header)?;
            let peer = Frame { header, body };
            if let Some(millis) = peer.body_millis() {
                session.notices.push_back(Notice::PeerTime(millis));
            }
            session.reply(Frame::acknowledge(Status::Enquiry));
        }
        Enquiry::ReturnTime => {
            // Any body sent with the request is not echoed.
            session.reader.read_body(&header)?;
            session.reply(Frame::enquiry_time(unix_millis()));
        }
    }
    session.notices.push_back(Notice::Enquired(kind));
    Ok(())
}

fn handle_acknowledge<R: Read>(session: &mut Session<'_, R>, header: Header) -> Result<()> {
    let confirmed = header.control1;
    info!(
        remote = %session.remote,
        status = confirmed,
        name = status_name(confirmed),
        "acknowledge received"
    );

    session.notices.push_back(Notice::Acknowledged(confirmed));
    if session.flow.on_acknowledge(confirmed) {
        info!(remote = %session.remote, "peer confirmed disconnect");
        session.actions.push(Action::Close);
    }
    Ok(())
}

fn handle_neg_acknowledge<R: Read>(session: &mut Session<'_, R>, header: Header) -> Result<()> {
    let refused = header.control1;
    info!(
        remote = %session.remote,
        status = refused,
        name = status_name(refused),
        "peer refused"
    );
    session.notices.push_back(Notice::Refused(refused));
    Ok(())
}

fn handle_idle<R: Read>(session: &mut Session<'_, R>, _header: Header) -> Result<()> {
    if session.flow.grant_idle() {
        info!(remote = %session.remote, "sleep granted");
        session.reply(Frame::acknowledge(Status::Idle));
    } else {
        info!(remote = %session.remote, incoming = %session.flow.incoming, "sleep refused");
        session.reply(Frame::refuse(Status::Idle));
    }
    Ok(())
}

fn handle_wakeup<R: Read>(session: &mut Session<'_, R>, _header: Header) -> Result<()> {
    if session.flow.grant_wakeup() {
        info!(remote = %session.remote, "wakeup granted");
        session.reply(Frame::acknowledge(Status::Wakeup));
    } else {
        info!(remote = %session.remote, incoming = %session.flow.incoming, "wakeup refused");
        session.reply(Frame::refuse(Status::Wakeup));
    }
    Ok(())
}

fn handle_escape<R: Read>(session: &mut Session<'_, R>, _header: Header) -> Result<()> {
    info!(remote = %session.remote, "disconnect requested");
    session.actions.push(Action::Flush(Frame::acknowledge(Status::Escape)));
    session.actions.push(Action::Close);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chop_frame::{decode_header, FrameError};

    use super::*;
    use crate::error::PeerError;
    use crate::flow::FlowState;

    struct Harness {
        reader: FrameReader<Cursor<Vec<u8>>>,
        flow: Flow,
        inbound: VecDeque<Bytes>,
        notices: VecDeque<Notice>,
    }

    impl Harness {
        fn new(body: Vec<u8>) -> Self {
            Self {
                reader: FrameReader::new(Cursor::new(body)),
                flow: Flow::default(),
                inbound: VecDeque::new(),
                notices: VecDeque::new(),
            }
        }

        fn feed(&mut self, header: [u8; 4]) -> Result<Vec<Action>> {
            let header = decode_header(header)?;
            let mut session = Session::new(
                &mut self.reader,
                &mut self.flow,
                &mut self.inbound,
                &mut self.notices,
                "127.0.0.1:50001".parse().unwrap(),
            );
            dispatch(&mut session, header)?;
            Ok(session.into_actions())
        }
    }

    fn queued(actions: &[Action]) -> Vec<[u8; 4]> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Queue(frame) => Some(frame.header.to_bytes()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn enquiry_normal_is_acknowledged() {
        let mut h = Harness::new(Vec::new());
        let actions = h.feed([0, 5, 0, 0]).unwrap();
        assert_eq!(queued(&actions), vec![[0, 6, 5, 0]]);
        assert_eq!(h.notices.pop_front(), Some(Notice::Enquired(Enquiry::Normal)));
    }

    #[test]
    fn enquiry_return_is_echoed_bare() {
        let mut h = Harness::new(Vec::new());
        let actions = h.feed([0, 5, 1, 0]).unwrap();
        assert_eq!(queued(&actions), vec![[0, 5, 0, 0]]);
    }

    #[test]
    fn enquiry_time_reads_clock_body() {
        let mut h = Harness::new(42i64.to_be_bytes().to_vec());
        let actions = h.feed([0, 5, 2, 8]).unwrap();
        assert_eq!(queued(&actions), vec![[0, 6, 5, 0]]);
        assert_eq!(h.notices.pop_front(), Some(Notice::PeerTime(42)));
        assert!(!h.reader.has_buffered());
    }

    #[test]
    fn enquiry_return_time_replies_with_own_clock() {
        let mut h = Harness::new(vec![0xAA; 8]);
        let before = unix_millis();
        let actions = h.feed([0, 5, 3, 8]).unwrap();

        let [Action::Queue(reply)] = actions.as_slice() else {
            panic!("expected one queued reply, got {actions:?}");
        };
        assert_eq!(reply.header.to_bytes(), [0, 5, 2, 8]);
        let millis = reply.body_millis().unwrap();
        assert!(millis >= before);
    }

    #[test]
    fn unknown_enquiry_type_refused() {
        let mut h = Harness::new(Vec::new());
        let actions = h.feed([0, 5, 9, 0]).unwrap();
        assert_eq!(queued(&actions), vec![[0, 21, 5, 0]]);
        assert!(h.notices.is_empty());
    }

    #[test]
    fn unknown_status_refused_with_offending_byte() {
        let mut h = Harness::new(Vec::new());
        let actions = h.feed([0, 200, 0, 0]).unwrap();
        assert_eq!(actions, vec![Action::Queue(Frame::refuse(200u8))]);
        assert_eq!(queued(&actions), vec![[0, 21, 200, 0]]);
    }

    #[test]
    fn unhandled_control_codes_refused() {
        for status in [1u8, 3, 4, 24, 31] {
            let mut h = Harness::new(Vec::new());
            let actions = h.feed([0, status, 0, 0]).unwrap();
            assert_eq!(queued(&actions), vec![[0, 21, status, 0]], "status {status}");
        }
    }

    #[test]
    fn null_is_a_no_op() {
        let mut h = Harness::new(Vec::new());
        assert!(h.feed([0, 0, 0, 0]).unwrap().is_empty());
    }

    #[test]
    fn text_is_delivered_and_acknowledged() {
        let mut h = Harness::new(b"hello".to_vec());
        let actions = h.feed([0, 2, 1, 5]).unwrap();
        assert_eq!(queued(&actions), vec![[0, 6, 2, 0]]);
        assert_eq!(h.inbound.pop_front().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn truncated_text_is_a_fault() {
        let mut h = Harness::new(b"hel".to_vec());
        let err = h.feed([0, 2, 1, 5]).unwrap_err();
        assert!(matches!(
            err,
            PeerError::Frame(FrameError::BodyTruncated { expected: 5, got: 3 })
        ));
        assert!(h.inbound.is_empty());
    }

    #[test]
    fn idle_granted_then_refused() {
        let mut h = Harness::new(Vec::new());
        assert_eq!(queued(&h.feed([0, 22, 0, 0]).unwrap()), vec![[0, 6, 22, 0]]);
        assert_eq!(h.flow.incoming, FlowState::Idle);
        assert_eq!(queued(&h.feed([0, 22, 0, 0]).unwrap()), vec![[0, 21, 22, 0]]);
        assert_eq!(h.flow.incoming, FlowState::Idle);
    }

    #[test]
    fn wakeup_refused_while_normal() {
        let mut h = Harness::new(Vec::new());
        assert_eq!(queued(&h.feed([0, 7, 0, 0]).unwrap()), vec![[0, 21, 7, 0]]);
        assert_eq!(h.flow.incoming, FlowState::Normal);
    }

    #[test]
    fn escape_flushes_ack_then_closes() {
        let mut h = Harness::new(Vec::new());
        let actions = h.feed([0, 27, 0, 0]).unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Flush(Frame::acknowledge(Status::Escape)),
                Action::Close
            ]
        );
    }

    #[test]
    fn escape_acknowledgement_cancels_and_closes() {
        let mut h = Harness::new(Vec::new());
        let actions = h.feed([0, 6, 27, 0]).unwrap();
        assert_eq!(actions, vec![Action::Close]);
        assert_eq!(h.flow.incoming, FlowState::Cancelled);
        assert_eq!(h.flow.outgoing, FlowState::Cancelled);
        assert_eq!(h.notices.pop_front(), Some(Notice::Acknowledged(27)));
    }

    #[test]
    fn refusal_is_recorded_without_state_change() {
        let mut h = Harness::new(Vec::new());
        let actions = h.feed([0, 21, 22, 0]).unwrap();
        assert!(actions.is_empty());
        assert_eq!(h.flow, Flow::default());
        assert_eq!(h.notices.pop_front(), Some(Notice::Refused(22)));
    }
}
