use chop_frame::{Enquiry, Frame, Status, TIME_PAYLOAD_LEN};
use chop_peer::unix_millis;

/// What a console line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Start the disconnect handshake.
    Escape,
    Frame(Frame),
}

/// Map one console line to a frame.
///
/// Keywords are matched exactly. Anything else is sent as text, with a
/// known length when it can be encoded and `END_TEXT` termination when it
/// cannot.
pub fn map_line(line: &str) -> Line {
    let frame = match line {
        "exit" => return Line::Escape,
        "ping" => Frame::enquiry(Enquiry::Normal),
        "pingret" => Frame::enquiry(Enquiry::Return),
        "pingtime" => Frame::enquiry_time(unix_millis()),
        "pingtimeret" => Frame::new(
            Status::Enquiry,
            Enquiry::ReturnTime.as_byte(),
            TIME_PAYLOAD_LEN as u8,
            unix_millis().to_be_bytes().to_vec(),
        ),
        "sleep" => Frame::idle(),
        "wake" => Frame::wakeup(),
        // Declares a 4-byte body and sends none; the peer takes the next
        // header as the body.
        "break" => Frame::bare(Status::StartText, 1, 4),
        text => {
            let body = text.as_bytes().to_vec();
            match Frame::text(body.clone()) {
                Ok(frame) => frame,
                Err(_) => Frame::unsized_text(body),
            }
        }
    };
    Line::Frame(frame)
}
