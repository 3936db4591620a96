//! Incremental frame extraction from arbitrary transport reads.
//!
//! Bytes are appended to one `BytesMut`; a header is decoded as soon as 48
//! bytes are buffered and kept as `pending` until its body is complete.
//! Frame bodies are split off the buffer without copying.
//!
//! # Example
//!
//! ```ignore
//! use streamwire::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in arbitrary chunks from the transport
//! for frame in buffer.push(&chunk)? {
//!     println!("{:?} for {}", frame.payload_type(), frame.id());
//! }
//! ```

use bytes::{Buf, Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE, MAX_PAYLOAD_LENGTH};
use super::Frame;
use crate::error::{Result, StreamingError};

/// Accumulates transport bytes and yields complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    /// Decoded header whose body is still arriving.
    pending: Option<Header>,
    /// Largest body a single frame may announce.
    max_frame_payload: u32,
}

impl FrameBuffer {
    /// Create a frame buffer accepting any frame the header can describe.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_LENGTH)
    }

    /// Create a frame buffer with a per-frame body limit.
    pub fn with_max_payload(max_frame_payload: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            pending: None,
            max_frame_payload,
        }
    }

    /// Append `data` and return every frame it completes, in wire order.
    ///
    /// # Errors
    ///
    /// `MalformedHeader` when header bytes do not decode, `PayloadTooLarge`
    /// when a header announces more than the per-frame limit. Either leaves
    /// the stream unrecoverable.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            let header = match self.pending.take() {
                Some(header) => header,
                None if self.buffer.len() >= HEADER_SIZE => self.take_header()?,
                None => break,
            };

            let body_len = header.payload_length as usize;
            if self.buffer.len() < body_len {
                self.pending = Some(header);
                break;
            }

            let body = if body_len == 0 {
                Bytes::new()
            } else {
                self.buffer.split_to(body_len).freeze()
            };
            frames.push(Frame::new(header, body));
        }

        Ok(frames)
    }

    fn take_header(&mut self) -> Result<Header> {
        let header = Header::decode(&self.buffer[..HEADER_SIZE])?;
        if header.payload_length > self.max_frame_payload {
            return Err(StreamingError::PayloadTooLarge {
                size: header.payload_length as usize,
                max: self.max_frame_payload as usize,
            });
        }
        self.buffer.advance(HEADER_SIZE);
        Ok(header)
    }

    /// Bytes a frame started on the wire still needs.
    ///
    /// Returns `(expected, buffered)` while a frame is incomplete, `None`
    /// when the buffer sits on a frame boundary.
    pub fn incomplete_frame(&self) -> Option<(usize, usize)> {
        match &self.pending {
            Some(header) => Some((header.payload_length as usize, self.buffer.len())),
            None if self.buffer.is_empty() => None,
            None => Some((HEADER_SIZE, self.buffer.len())),
        }
    }

    /// Check if a header was decoded and its body is still arriving.
    pub fn awaiting_body(&self) -> bool {
        self.pending.is_some()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes and any half-read frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending = None;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
