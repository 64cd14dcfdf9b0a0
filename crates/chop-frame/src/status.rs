//! Status and enquiry codes.
//!
//! Status values reuse the ASCII control characters. Only the codes below
//! carry protocol meaning; every other byte is answered with
//! `NEG_ACKNOWLEDGE`.

/// Frame status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// No-op.
    Null = 0,
    /// Reserved for extended headers; not handled.
    StartHeader = 1,
    /// Text body follows.
    StartText = 2,
    /// Terminator for unknown-length text.
    EndText = 3,
    /// Ping, with a sub-type in control1.
    Enquiry = 5,
    /// Confirms the status named in control1.
    Acknowledge = 6,
    /// Wake request.
    Wakeup = 7,
    /// Refuses the status named in control1.
    NegAcknowledge = 21,
    /// Sleep request.
    Idle = 22,
    /// Terminal flow-control marker; never sent as a request.
    Cancel = 24,
    /// Disconnect request.
    Escape = 27,
}

impl Status {
    /// Map a raw status byte to a known status.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Null),
            1 => Some(Self::StartHeader),
            2 => Some(Self::StartText),
            3 => Some(Self::EndText),
            5 => Some(Self::Enquiry),
            6 => Some(Self::Acknowledge),
            7 => Some(Self::Wakeup),
            21 => Some(Self::NegAcknowledge),
            22 => Some(Self::Idle),
            24 => Some(Self::Cancel),
            27 => Some(Self::Escape),
            _ => None,
        }
    }

    /// The wire byte for this status.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status.as_byte()
    }
}

/// Enquiry sub-type carried in control1 when status is `ENQUIRY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Enquiry {
    /// Plain ping, answered with `ACKNOWLEDGE/ENQUIRY`.
    Normal = 0,
    /// Ping answered with a bare `ENQUIRY`.
    Return = 1,
    /// Ping carrying the sender's clock in a control2-byte body.
    Time = 2,
    /// Ping answered with the responder's clock.
    ReturnTime = 3,
}

impl Enquiry {
    /// Map a raw control1 byte to a known enquiry sub-type.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Normal),
            1 => Some(Self::Return),
            2 => Some(Self::Time),
            3 => Some(Self::ReturnTime),
            _ => None,
        }
    }

    /// The wire byte for this sub-type.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Human-readable name for a status byte, for diagnostics.
///
/// Covers the whole ASCII control range so unhandled codes still log with
/// their conventional names.
pub fn status_name(byte: u8) -> &'static str {
    const NAMES: [&str; 32] = [
        "NULL",
        "START_HEADER",
        "START_TEXT",
        "END_TEXT",
        "END_TRANSMISSION",
        "ENQUIRY",
        "ACKNOWLEDGE",
        "WAKEUP",
        "BACKSPACE",
        "HORIZONTAL_TAB",
        "LINE_FEED",
        "VERTICAL_TAB",
        "FORM_FEED",
        "CARRIAGE_RETURN",
        "SHIFT_OUT",
        "SHIFT_IN",
        "START_DATA",
        "CONTROL_ONE",
        "CONTROL_TWO",
        "CONTROL_THREE",
        "CONTROL_FOUR",
        "NEG_ACKNOWLEDGE",
        "IDLE",
        "END_TRANSMISSION_BLOCK",
        "CANCEL",
        "END_OF_MEDIUM",
        "SUBSTITUTE",
        "ESCAPE",
        "FILE_SEPARATOR",
        "GROUP_SEPARATOR",
        "RECORD_SEPARATOR",
        "UNIT_SEPARATOR",
    ];

    NAMES.get(byte as usize).copied().unwrap_or("UNDEFINED")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bytes_match_ascii_controls() {
        let expected = [
            (Status::Null, 0),
            (Status::StartHeader, 1),
            (Status::StartText, 2),
            (Status::EndText, 3),
            (Status::Enquiry, 5),
            (Status::Acknowledge, 6),
            (Status::Wakeup, 7),
            (Status::NegAcknowledge, 21),
            (Status::Idle, 22),
            (Status::Cancel, 24),
            (Status::Escape, 27),
        ];
        for (status, byte) in expected {
            assert_eq!(status.as_byte(), byte);
            assert_eq!(Status::from_byte(byte), Some(status));
        }
    }

    #[test]
    fn unassigned_status_bytes_are_unknown() {
        for byte in [4u8, 8, 20, 23, 25, 26, 28, 31, 127, 200, 255] {
            assert_eq!(Status::from_byte(byte), None, "byte {byte}");
        }
    }

    #[test]
    fn enquiry_sub_types() {
        assert_eq!(Enquiry::from_byte(0), Some(Enquiry::Normal));
        assert_eq!(Enquiry::from_byte(3), Some(Enquiry::ReturnTime));
        assert_eq!(Enquiry::from_byte(4), None);
    }

    #[test]
    fn names_cover_control_range() {
        assert_eq!(status_name(Status::Escape.as_byte()), "ESCAPE");
        assert_eq!(status_name(Status::NegAcknowledge.as_byte()), "NEG_ACKNOWLEDGE");
        assert_eq!(status_name(4), "END_TRANSMISSION");
        assert_eq!(status_name(200), "UNDEFINED");
    }
}
