/// Errors that can occur during frame encoding/decoding.
///
/// Every variant raised while reading means the byte stream can no longer
/// be trusted to sit on a header boundary; the connection must be dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The first header byte was not the reserved `0x00`.
    #[error("invalid reserved header byte 0x{0:02x} (expected 0x00)")]
    InvalidReserved(u8),

    /// Fewer than four header bytes arrived in one read.
    #[error("short header ({got} of 4 bytes)")]
    ShortHeader { got: usize },

    /// The stream ended inside a declared-length body segment.
    #[error("body segment truncated ({got} of {expected} bytes)")]
    BodyTruncated { expected: usize, got: usize },

    /// The stream ended before an unknown-length text hit `END_TEXT`.
    #[error("unterminated text section ({got} bytes without END_TEXT)")]
    UnterminatedText { got: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A text body length has no factorization into two control bytes.
    #[error("text length {len} cannot be expressed as control1 x control2 (both <= 127)")]
    TextLengthUnencodable { len: usize },

    /// The window cannot carry a whole header in one segment.
    #[error("invalid window size {window} (minimum 4)")]
    InvalidWindow { window: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
