//! Protocol module - wire format, framing, and envelopes.
//!
//! This module implements the byte-level protocol:
//! - 48-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - JSON request/response envelopes

mod envelope;
mod frame;
mod frame_buffer;
mod wire_format;

pub use envelope::{referenced_streams, RequestEnvelope, ResponseEnvelope, StreamDescription};
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    decode_header, encode_header, Header, PayloadType, StreamId, DEFAULT_MAX_FRAME_SIZE,
    HEADER_SIZE, MAX_PAYLOAD_LENGTH,
};
