//! Error types for streamwire.

use thiserror::Error;

use crate::protocol::StreamId;

/// Main error type for all streaming operations.
#[derive(Debug, Error)]
pub enum StreamingError {
    /// I/O error during pipe/socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (envelopes and JSON bodies).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Header bytes could not be decoded.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Declared frame length does not match what the transport delivered or accepted.
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A payload is already being assembled under this id.
    #[error("Duplicate stream: {0}")]
    DuplicateStream(StreamId),

    /// The caller cancelled the request before a response arrived.
    #[error("Request cancelled")]
    Cancelled,

    /// The connection went away.
    #[error("Disconnected")]
    Disconnected,

    /// An operation that needs a stream id was given the nil id.
    #[error("An ID must be supplied")]
    MissingId,

    /// The single reader of a stream has already been handed out.
    #[error("Stream reader already taken")]
    ReaderTaken,

    /// Write attempted after the stream ended.
    #[error("Stream closed")]
    StreamClosed,

    /// Reassembled payload grew past the configured limit.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Any other protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl StreamingError {
    /// Whether this error means frame boundaries can no longer be trusted
    /// and the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamingError::Io(_)
                | StreamingError::WebSocket(_)
                | StreamingError::MalformedHeader(_)
                | StreamingError::LengthMismatch { .. }
                | StreamingError::PayloadTooLarge { .. }
        )
    }
}

/// Result type alias using StreamingError.
pub type Result<T> = std::result::Result<T, StreamingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(StreamingError::MalformedHeader("x".into()).is_fatal());
        assert!(StreamingError::LengthMismatch {
            expected: 10,
            actual: 3
        }
        .is_fatal());
        assert!(!StreamingError::Cancelled.is_fatal());
        assert!(!StreamingError::DuplicateStream(StreamId::nil()).is_fatal());
        assert!(!StreamingError::Disconnected.is_fatal());
    }

    #[test]
    fn test_missing_id_message() {
        assert_eq!(StreamingError::MissingId.to_string(), "An ID must be supplied");
    }
}
