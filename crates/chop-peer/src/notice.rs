use chop_frame::Enquiry;

/// A protocol event surfaced to the application alongside text payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The peer acknowledged the status in control1.
    Acknowledged(u8),
    /// The peer refused the status in control1.
    Refused(u8),
    /// The peer sent its clock, in milliseconds since the Unix epoch.
    PeerTime(i64),
    /// The peer sent an enquiry of this kind.
    Enquired(Enquiry),
}

impl Notice {
    /// Short label for display.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Acknowledged(_) => "acknowledged",
            Self::Refused(_) => "refused",
            Self::PeerTime(_) => "peer_time",
            Self::Enquired(_) => "enquired",
        }
    }
}
