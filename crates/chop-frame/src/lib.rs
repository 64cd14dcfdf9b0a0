//! Chop packet codec and window-segmented I/O.
//!
//! Every Chop message starts with a 4-byte header:
//! - a reserved byte, always `0x00`
//! - a status byte selecting the message type
//! - two control bytes whose meaning depends on the status
//!
//! Bodies carry no length field of their own. Their size is derived from
//! the control bytes (or found by scanning for `END_TEXT`), and they move
//! over the socket in window-sized segments.

pub mod codec;
pub mod error;
pub mod reader;
pub mod status;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode_frame, segment_sizes, text_controls, BodyRule, Frame,
    FrameConfig, Header, DEFAULT_WINDOW, HEADER_SIZE, MAX_CONTROL_FACTOR, MAX_TEXT_LEN, RESERVED,
    TIME_PAYLOAD_LEN,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use status::{status_name, Enquiry, Status};
pub use writer::FrameWriter;
