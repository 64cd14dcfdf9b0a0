use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{decode_header, segment_sizes, BodyRule, Frame, FrameConfig, Header, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::status::Status;

/// Reads headers and window-segmented bodies from a non-blocking stream.
///
/// Bodies are pulled one window at a time. Bytes read past the end of an
/// unknown-length text are held back and served first on the next read.
pub struct FrameReader<T> {
    inner: T,
    pending: BytesMut,
    scratch: Vec<u8>,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            pending: BytesMut::new(),
            scratch: vec![0u8; config.window.max(1)],
            config,
        }
    }

    /// Read the next header.
    ///
    /// Exactly four bytes are expected from a single read. Returns
    /// `Ok(None)` if nothing is available yet, `ConnectionClosed` at end of
    /// stream and `ShortHeader` if fewer than four bytes arrived.
    pub fn read_header(&mut self) -> Result<Option<Header>> {
        let mut raw = [0u8; HEADER_SIZE];
        let mut got = self.take_pending(&mut raw);

        if got < HEADER_SIZE {
            match read_once(&mut self.inner, &mut raw[got..]) {
                Ok(0) if got == 0 => return Err(FrameError::ConnectionClosed),
                Ok(n) => got += n,
                Err(err) if err.kind() == ErrorKind::WouldBlock && got == 0 => return Ok(None),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        if got < HEADER_SIZE {
            return Err(FrameError::ShortHeader { got });
        }

        decode_header(raw).map(Some)
    }

    /// Read the body that `header` declares.
    pub fn read_body(&mut self, header: &Header) -> Result<Bytes> {
        match header.body_rule() {
            BodyRule::Empty => Ok(Bytes::new()),
            BodyRule::Exact(len) => self.read_segmented(len),
            BodyRule::UntilEndText => self.read_until_end_text(),
        }
    }

    /// Read the next whole frame, or `Ok(None)` if no header is available.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };
        let body = self.read_body(&header)?;
        Ok(Some(Frame { header, body }))
    }

    /// Read exactly `len` bytes in `ceil(len / window)` segments.
    ///
    /// Each segment spins until all of its bytes have arrived and never
    /// reads past its own end. End of stream inside a segment is fatal.
    pub fn read_segmented(&mut self, len: usize) -> Result<Bytes> {
        if len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }

        let mut body = BytesMut::zeroed(len);
        let mut offset = 0usize;
        for expected in segment_sizes(len, self.config.window) {
            self.read_segment(&mut body[offset..offset + expected])?;
            offset += expected;
        }

        trace!(len, window = self.config.window, "read known-length body");
        Ok(body.freeze())
    }

    /// Read window-sized segments until one contains `END_TEXT`.
    ///
    /// The payload stops at the first `END_TEXT` byte, even when that byte
    /// was meant as content; there is no escaping. Bytes after the marker
    /// in the same segment are kept for the next header.
    pub fn read_until_end_text(&mut self) -> Result<Bytes> {
        let end = Status::EndText.as_byte();
        let mut body = BytesMut::new();

        loop {
            let n = self.read_window()?;
            if n == 0 {
                return Err(FrameError::UnterminatedText { got: body.len() });
            }

            let segment = &self.scratch[..n];
            if let Some(pos) = segment.iter().position(|&b| b == end) {
                body.extend_from_slice(&segment[..pos]);
                let leftover = Bytes::copy_from_slice(&segment[pos + 1..]);
                self.unread(&leftover);
                trace!(len = body.len(), "read unknown-length body");
                return Ok(body.freeze());
            }

            body.extend_from_slice(segment);
            if body.len() > self.config.max_payload_size {
                return Err(FrameError::PayloadTooLarge {
                    size: body.len(),
                    max: self.config.max_payload_size,
                });
            }
        }
    }

    /// Whether bytes from a previous segment are waiting to be consumed.
    pub fn has_buffered(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn read_segment(&mut self, segment: &mut [u8]) -> Result<()> {
        let expected = segment.len();
        let mut filled = self.take_pending(segment);
        while filled < expected {
            match self.inner.read(&mut segment[filled..]) {
                Ok(0) => {
                    return Err(FrameError::BodyTruncated {
                        expected,
                        got: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Fill the scratch window from held-back bytes or one socket read,
    /// spinning until at least one byte (or end of stream) arrives.
    fn read_window(&mut self) -> Result<usize> {
        let window = self.config.window.max(1);
        if !self.pending.is_empty() {
            let n = window.min(self.pending.len());
            let head = self.pending.split_to(n);
            self.scratch[..n].copy_from_slice(&head);
            return Ok(n);
        }

        loop {
            match self.inner.read(&mut self.scratch[..window]) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn take_pending(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.pending.len());
        if n > 0 {
            let head = self.pending.split_to(n);
            dst[..n].copy_from_slice(&head);
        }
        n
    }

    fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut front = BytesMut::with_capacity(bytes.len() + self.pending.len());
        front.extend_from_slice(bytes);
        front.extend_from_slice(&self.pending);
        self.pending = front;
    }
}

fn read_once<T: Read>(inner: &mut T, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match inner.read(buf) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
