//! Frame struct with typed accessors.
//!
//! Represents one header plus the body bytes it announces.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use streamwire::protocol::{Frame, Header, PayloadType, StreamId};
//! use bytes::Bytes;
//!
//! let header = Header::new(PayloadType::Stream, 5, StreamId::new(), true);
//! let frame = Frame::new(header, Bytes::from_static(b"hello"));
//!
//! assert!(frame.is_end());
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::{Header, PayloadType, StreamId, HEADER_SIZE};
use crate::error::Result;

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the stream id.
    #[inline]
    pub fn id(&self) -> StreamId {
        self.header.id
    }

    /// Get the payload type.
    #[inline]
    pub fn payload_type(&self) -> PayloadType {
        self.header.payload_type
    }

    /// Check if this frame completes its payload.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.header.end
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use streamwire::protocol::{build_frame, Header, PayloadType, StreamId, HEADER_SIZE};
///
/// let header = Header::new(PayloadType::Stream, 5, StreamId::new(), true);
/// let bytes = build_frame(&header, b"hello").unwrap();
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode()?);
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let id = StreamId::new();
        let header = Header::new(PayloadType::Response, 5, id, true);
        let frame = Frame::new(header, Bytes::from_static(b"hello"));

        assert_eq!(frame.id(), id);
        assert_eq!(frame.payload_type(), PayloadType::Response);
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.payload_len(), 5);
        assert!(frame.is_end());
    }

    #[test]
    fn test_build_frame() {
        let header = Header::new(PayloadType::Request, 5, StreamId::new(), false);
        let bytes = build_frame(&header, b"hello").unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        let parsed = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let header = Header::new(PayloadType::CancelAll, 0, StreamId::new(), true);
        let bytes = build_frame(&header, b"").unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
    }

    #[test]
    fn test_build_frame_roundtrip_through_buffer() {
        use super::super::FrameBuffer;

        let header = Header::new(PayloadType::Stream, 10, StreamId::new(), true);
        let bytes = build_frame(&header, b"0123456789").unwrap();

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header, header);
        assert_eq!(frames[0].payload(), b"0123456789");
    }
}
