use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::status::{Enquiry, Status};

/// Frame header: reserved (1) + status (1) + control1 (1) + control2 (1).
pub const HEADER_SIZE: usize = 4;

/// Value of the leading header byte.
pub const RESERVED: u8 = 0x00;

/// Default segmentation window in bytes.
pub const DEFAULT_WINDOW: usize = 255;

/// Largest value either control byte may take when declaring a text length.
pub const MAX_CONTROL_FACTOR: usize = 127;

/// Largest text body a header can declare (127 × 127).
pub const MAX_TEXT_LEN: usize = MAX_CONTROL_FACTOR * MAX_CONTROL_FACTOR;

/// Size of a clock body: milliseconds since the Unix epoch, big-endian.
pub const TIME_PAYLOAD_LEN: usize = 8;

/// The fixed 4-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub status: u8,
    pub control1: u8,
    pub control2: u8,
}

/// How the body following a header is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyRule {
    /// No body.
    Empty,
    /// Exactly this many bytes.
    Exact(usize),
    /// Bytes up to the first `END_TEXT`, which is consumed but not kept.
    UntilEndText,
}

impl Header {
    /// Create a header.
    pub fn new(status: impl Into<u8>, control1: u8, control2: u8) -> Self {
        Self {
            status: status.into(),
            control1,
            control2,
        }
    }

    /// The header as it appears on the wire.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        [RESERVED, self.status, self.control1, self.control2]
    }

    /// The status as a known code, if it is one.
    pub fn status_kind(&self) -> Option<Status> {
        Status::from_byte(self.status)
    }

    /// The header packed into a big-endian u32, for diagnostics.
    pub fn style(&self) -> u32 {
        u32::from_be_bytes(self.to_bytes())
    }

    /// Delimiting rule for the body that follows this header.
    pub fn body_rule(&self) -> BodyRule {
        match self.status_kind() {
            Some(Status::StartText) if self.control1 == 0 && self.control2 == 0 => {
                BodyRule::UntilEndText
            }
            Some(Status::StartText) => {
                BodyRule::Exact(self.control1 as usize * self.control2 as usize)
            }
            Some(Status::Enquiry) => match Enquiry::from_byte(self.control1) {
                Some(Enquiry::Time) | Some(Enquiry::ReturnTime) => {
                    BodyRule::Exact(self.control2 as usize)
                }
                _ => BodyRule::Empty,
            },
            _ => BodyRule::Empty,
        }
    }
}

/// A complete Chop message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    /// Body bytes, excluding any `END_TEXT` terminator.
    pub body: Bytes,
}

impl Frame {
    /// Create a frame from raw parts.
    pub fn new(status: impl Into<u8>, control1: u8, control2: u8, body: impl Into<Bytes>) -> Self {
        Self {
            header: Header::new(status, control1, control2),
            body: body.into(),
        }
    }

    /// A header-only frame.
    pub fn bare(status: impl Into<u8>, control1: u8, control2: u8) -> Self {
        Self::new(status, control1, control2, Bytes::new())
    }

    /// Known-length text. The length is split across the control bytes.
    pub fn text(body: impl Into<Bytes>) -> Result<Self> {
        let body = body.into();
        let (control1, control2) = text_controls(body.len())?;
        Ok(Self::new(Status::StartText, control1, control2, body))
    }

    /// Unknown-length text, terminated on the wire by `END_TEXT`.
    ///
    /// A body containing an `END_TEXT` byte is cut short at that byte by
    /// the receiver; the marker is not escaped.
    pub fn unsized_text(body: impl Into<Bytes>) -> Self {
        Self::new(Status::StartText, 0, 0, body)
    }

    /// An enquiry without a body.
    pub fn enquiry(kind: Enquiry) -> Self {
        Self::bare(Status::Enquiry, kind.as_byte(), 0)
    }

    /// `ENQUIRY/TIME` carrying a millisecond timestamp.
    pub fn enquiry_time(millis: i64) -> Self {
        Self::new(
            Status::Enquiry,
            Enquiry::Time.as_byte(),
            TIME_PAYLOAD_LEN as u8,
            Bytes::copy_from_slice(&millis.to_be_bytes()),
        )
    }

    /// `ACKNOWLEDGE` for `status`.
    pub fn acknowledge(status: impl Into<u8>) -> Self {
        Self::bare(Status::Acknowledge, status.into(), 0)
    }

    /// `NEG_ACKNOWLEDGE` for `status`.
    pub fn refuse(status: impl Into<u8>) -> Self {
        Self::bare(Status::NegAcknowledge, status.into(), 0)
    }

    /// Sleep request.
    pub fn idle() -> Self {
        Self::bare(Status::Idle, 0, 0)
    }

    /// Wake request.
    pub fn wakeup() -> Self {
        Self::bare(Status::Wakeup, 0, 0)
    }

    /// Disconnect request.
    pub fn escape() -> Self {
        Self::bare(Status::Escape, 0, 0)
    }

    /// The total wire size of this frame (header + body + terminator).
    pub fn wire_size(&self) -> usize {
        let terminator = usize::from(self.header.body_rule() == BodyRule::UntilEndText);
        HEADER_SIZE + self.body.len() + terminator
    }

    /// Encode this frame into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut dst);
        dst.freeze()
    }

    /// The body as a big-endian millisecond timestamp, if it is one.
    pub fn body_millis(&self) -> Option<i64> {
        let bytes: [u8; TIME_PAYLOAD_LEN] = self.body.as_ref().try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }
}

/// Split a text length into `(control1, control2)`.
///
/// Lengths up to 127 are sent as `1 × len`. Longer bodies use the smallest
/// divisor `i` with `1 < i <= sqrt(len)` such that both `i` and `len / i`
/// fit in 127. Lengths with no such divisor (primes above 127, anything
/// above 127 × 127) are rejected rather than truncated into the header.
pub fn text_controls(len: usize) -> Result<(u8, u8)> {
    if len <= MAX_CONTROL_FACTOR {
        return Ok((1, len as u8));
    }

    let mut divisor = 2usize;
    while divisor * divisor <= len {
        if len % divisor == 0 {
            let quotient = len / divisor;
            if divisor <= MAX_CONTROL_FACTOR && quotient <= MAX_CONTROL_FACTOR {
                return Ok((divisor as u8, quotient as u8));
            }
        }
        divisor += 1;
    }

    Err(FrameError::TextLengthUnencodable { len })
}

/// Sizes of the window segments needed to move `len` bytes.
///
/// Yields `ceil(len / window)` values, all equal to `window` except a
/// shorter final one.
pub fn segment_sizes(len: usize, window: usize) -> impl Iterator<Item = usize> {
    let window = window.max(1);
    let mut remaining = len;
    std::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }
        let next = remaining.min(window);
        remaining -= next;
        Some(next)
    })
}

/// Decode a 4-byte header.
pub fn decode_header(src: [u8; HEADER_SIZE]) -> Result<Header> {
    if src[0] != RESERVED {
        return Err(FrameError::InvalidReserved(src[0]));
    }
    Ok(Header {
        status: src[1],
        control1: src[2],
        control2: src[3],
    })
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬────────┬──────────┬──────────┬──────────────────────┐
/// │ Reserved │ Status │ Control1 │ Control2 │ Body (status rules)  │
/// │ 0x00     │ (1B)   │ (1B)     │ (1B)     │ [+ END_TEXT if 0/0]  │
/// └──────────┴────────┴──────────┴──────────┴──────────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    dst.reserve(frame.wire_size());
    dst.put_slice(&frame.header.to_bytes());
    dst.put_slice(&frame.body);
    if frame.header.body_rule() == BodyRule::UntilEndText {
        dst.put_u8(Status::EndText.as_byte());
    }
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(&src[..HEADER_SIZE]);
    let header = decode_header(raw)?;

    let (body_len, consumed) = match header.body_rule() {
        BodyRule::Empty => (0, 0),
        BodyRule::Exact(len) => (len, len),
        BodyRule::UntilEndText => {
            let end = Status::EndText.as_byte();
            match src[HEADER_SIZE..].iter().position(|&b| b == end) {
                Some(pos) => (pos, pos + 1),
                None => return Ok(None),
            }
        }
    };

    if src.len() < HEADER_SIZE + consumed {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();
    src.advance(consumed - body_len);

    Ok(Some(Frame { header, body }))
}

/// Configuration for the windowed reader and writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Segment size for socket reads and writes. Local only; never sent.
    pub window: usize,
    /// Maximum body size accepted by the reader.
    pub max_payload_size: usize,
}

impl FrameConfig {
    /// Default configuration with an explicit window.
    pub fn with_window(window: usize) -> Result<Self> {
        let config = Self {
            window,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject windows too small to carry a header in one segment.
    pub fn validate(&self) -> Result<()> {
        if self.window < HEADER_SIZE {
            return Err(FrameError::InvalidWindow {
                window: self.window,
            });
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_payload_size: MAX_TEXT_LEN,
        }
    }
}
