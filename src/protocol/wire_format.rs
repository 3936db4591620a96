//! Wire format encoding and decoding.
//!
//! Implements the 48-byte ASCII header format:
//! ```text
//! ┌──────┬───┬──────────┬───┬──────────────────────────────────────┬───┬─────┬────┐
//! │ Type │ . │ Length   │ . │ Stream ID                            │ . │ End │ \n │
//! │ 1    │ 1 │ 6 digits │ 1 │ 36 chars (hyphenated UUID)           │ 1 │ 1   │ 1  │
//! └──────┴───┴──────────┴───┴──────────────────────────────────────┴───┴─────┴────┘
//! ```
//!
//! Length is zero-padded decimal and counts the body bytes of this frame.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StreamingError};

/// Header size in bytes (fixed, exactly 48).
pub const HEADER_SIZE: usize = 48;

/// Largest body length the 6-digit length field can carry.
pub const MAX_PAYLOAD_LENGTH: u32 = 999_999;

/// Default maximum body bytes per frame on send.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;

const DELIMITER: u8 = b'.';
const TERMINATOR: u8 = b'\n';

const TYPE_OFFSET: usize = 0;
const TYPE_DELIMITER_OFFSET: usize = 1;
const LENGTH_OFFSET: usize = 2;
const LENGTH_LENGTH: usize = 6;
const LENGTH_DELIMITER_OFFSET: usize = 8;
const ID_OFFSET: usize = 9;
const ID_LENGTH: usize = 36;
const ID_DELIMITER_OFFSET: usize = 45;
const END_OFFSET: usize = 46;
const TERMINATOR_OFFSET: usize = 47;

/// Identifier shared by all frames of one logical payload.
///
/// Also correlates a request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil id, meaning "no id supplied".
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Check for the nil id.
    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for StreamId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Kind of logical payload a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// JSON request envelope.
    Request,
    /// JSON response envelope.
    Response,
    /// Opaque body referenced from an envelope.
    Stream,
    /// Abort every payload in flight.
    CancelAll,
    /// Abort the payload with this frame's id.
    CancelStream,
}

impl PayloadType {
    /// The single-character wire code.
    pub fn as_byte(self) -> u8 {
        match self {
            PayloadType::Request => b'A',
            PayloadType::Response => b'B',
            PayloadType::Stream => b'S',
            PayloadType::CancelAll => b'X',
            PayloadType::CancelStream => b'C',
        }
    }

    /// Parse a wire code.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(PayloadType::Request),
            b'B' => Some(PayloadType::Response),
            b'S' => Some(PayloadType::Stream),
            b'X' => Some(PayloadType::CancelAll),
            b'C' => Some(PayloadType::CancelStream),
            _ => None,
        }
    }

    /// Check if this is one of the cancel signals.
    #[inline]
    pub fn is_cancel(self) -> bool {
        matches!(self, PayloadType::CancelAll | PayloadType::CancelStream)
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Kind of payload.
    pub payload_type: PayloadType,
    /// Body bytes following this header.
    pub payload_length: u32,
    /// Logical payload identifier.
    pub id: StreamId,
    /// Set on the frame that completes the payload.
    pub end: bool,
}

impl Header {
    /// Create a new header.
    pub fn new(payload_type: PayloadType, payload_length: u32, id: StreamId, end: bool) -> Self {
        Self {
            payload_type,
            payload_length,
            id,
            end,
        }
    }

    /// Encode header to its 48 ASCII bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use streamwire::protocol::{Header, PayloadType, StreamId, HEADER_SIZE};
    ///
    /// let header = Header::new(PayloadType::Request, 168, StreamId::new(), true);
    /// let bytes = header.encode().unwrap();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..9], b"A.000168.");
    /// ```
    ///
    /// # Errors
    ///
    /// Fails when `payload_length` does not fit the 6-digit field.
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (48 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        debug_assert!(buf.len() >= HEADER_SIZE);
        if self.payload_length > MAX_PAYLOAD_LENGTH {
            return Err(StreamingError::PayloadTooLarge {
                size: self.payload_length as usize,
                max: MAX_PAYLOAD_LENGTH as usize,
            });
        }

        buf[TYPE_OFFSET] = self.payload_type.as_byte();
        buf[TYPE_DELIMITER_OFFSET] = DELIMITER;

        let length = format!("{:06}", self.payload_length);
        buf[LENGTH_OFFSET..LENGTH_OFFSET + LENGTH_LENGTH].copy_from_slice(length.as_bytes());
        buf[LENGTH_DELIMITER_OFFSET] = DELIMITER;

        self.id
            .as_uuid()
            .hyphenated()
            .encode_lower(&mut buf[ID_OFFSET..ID_OFFSET + ID_LENGTH]);
        buf[ID_DELIMITER_OFFSET] = DELIMITER;

        buf[END_OFFSET] = if self.end { b'1' } else { b'0' };
        buf[TERMINATOR_OFFSET] = TERMINATOR;
        Ok(())
    }

    /// Decode header from bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use streamwire::protocol::{Header, PayloadType};
    ///
    /// let bytes = b"S.004096.8e3c7c4a-1b7e-4d54-9a4c-0c6f3f3b9d11.0\n";
    /// let header = Header::decode(bytes).unwrap();
    /// assert_eq!(header.payload_type, PayloadType::Stream);
    /// assert_eq!(header.payload_length, 4096);
    /// assert!(!header.end);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `MalformedHeader` describing the first field that does not parse.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(malformed(format!(
                "need {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        for offset in [
            TYPE_DELIMITER_OFFSET,
            LENGTH_DELIMITER_OFFSET,
            ID_DELIMITER_OFFSET,
        ] {
            if buf[offset] != DELIMITER {
                return Err(malformed(format!("missing delimiter at offset {}", offset)));
            }
        }
        if buf[TERMINATOR_OFFSET] != TERMINATOR {
            return Err(malformed("missing terminator".to_string()));
        }

        let payload_type = PayloadType::from_byte(buf[TYPE_OFFSET]).ok_or_else(|| {
            malformed(format!("unknown payload type {:?}", buf[TYPE_OFFSET] as char))
        })?;

        let length_field = &buf[LENGTH_OFFSET..LENGTH_OFFSET + LENGTH_LENGTH];
        if !length_field.iter().all(u8::is_ascii_digit) {
            return Err(malformed("length is not a number".to_string()));
        }
        let payload_length = length_field
            .iter()
            .fold(0u32, |acc, digit| acc * 10 + u32::from(digit - b'0'));

        let id_field = std::str::from_utf8(&buf[ID_OFFSET..ID_OFFSET + ID_LENGTH])
            .map_err(|_| malformed("id is not ASCII".to_string()))?;
        let id = Uuid::parse_str(id_field)
            .map_err(|e| malformed(format!("invalid id: {}", e)))?;

        let end = match buf[END_OFFSET] {
            b'1' => true,
            b'0' => false,
            other => return Err(malformed(format!("invalid end flag {:?}", other as char))),
        };

        Ok(Self {
            payload_type,
            payload_length,
            id: StreamId::from(id),
            end,
        })
    }
}

fn malformed(reason: String) -> StreamingError {
    StreamingError::MalformedHeader(reason)
}

/// Encode a header to bytes (standalone function).
#[inline]
pub fn encode_header(header: &Header) -> Result<[u8; HEADER_SIZE]> {
    header.encode()
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    Header::decode(buf)
}
