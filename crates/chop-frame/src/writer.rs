use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, segment_sizes, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete frames to any `Write` stream, one window at a time.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write a complete frame.
    ///
    /// The encoded header and body go out in segments of at most `window`
    /// bytes. A segment that would block is retried until it is accepted.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.body.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.body.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(frame, &mut self.buf);
        let encoded = self.buf.split().freeze();
        self.write_encoded(&encoded)?;

        trace!(
            status = frame.header.status,
            len = frame.body.len(),
            "frame written"
        );
        Ok(())
    }

    /// Write already-encoded bytes in window-sized segments.
    pub fn write_encoded(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        for segment in segment_sizes(bytes.len(), self.config.window) {
            self.write_segment(&bytes[offset..offset + segment])?;
            offset += segment;
        }
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn write_segment(&mut self, segment: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < segment.len() {
            match self.inner.write(&segment[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }
}
