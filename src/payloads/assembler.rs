//! Reassembly of one logical payload from its frames.

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, StreamingError};
use crate::protocol::{
    referenced_streams, Header, PayloadType, RequestEnvelope, ResponseEnvelope, StreamId,
};
use crate::stream::SubscribableStream;

/// Default upper bound on one reassembled payload (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Result of the frame that completed a payload.
#[derive(Debug)]
pub enum Assembled {
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
    /// Body left in the stream for its consumer.
    Stream,
}

/// Reassembly state for one id.
#[derive(Debug)]
pub struct PayloadAssembler {
    id: StreamId,
    payload_type: PayloadType,
    content_length: usize,
    end: bool,
    stream: Option<SubscribableStream>,
    received: usize,
    max_payload_size: usize,
    /// Bodies named by an envelope that failed to parse.
    orphaned: Vec<StreamId>,
}

impl PayloadAssembler {
    /// Create an assembler from the first header of a payload.
    ///
    /// # Errors
    ///
    /// `MissingId` if the header carries the nil id.
    pub fn new(header: &Header) -> Result<Self> {
        if header.id.is_nil() {
            return Err(StreamingError::MissingId);
        }
        Ok(Self {
            id: header.id,
            payload_type: header.payload_type,
            content_length: header.payload_length as usize,
            end: header.end,
            stream: None,
            received: 0,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            orphaned: Vec::new(),
        })
    }

    /// Create an assembler that writes into an existing stream.
    pub fn with_stream(header: &Header, stream: SubscribableStream) -> Result<Self> {
        let mut assembler = Self::new(header)?;
        assembler.stream = Some(stream);
        Ok(assembler)
    }

    /// Set the reassembly size limit.
    pub fn max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    /// Body length announced by the first header.
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// End flag of the last header seen.
    pub fn end(&self) -> bool {
        self.end
    }

    /// Bytes appended so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Create a fresh, unregistered stream.
    pub fn create_payload_stream(&self) -> SubscribableStream {
        SubscribableStream::new()
    }

    /// The stream this assembler writes into, created on first use.
    pub fn get_payload_stream(&mut self) -> SubscribableStream {
        self.stream
            .get_or_insert_with(SubscribableStream::new)
            .clone()
    }

    /// Append one frame body.
    ///
    /// Returns the finished payload when `header.end` is set.
    ///
    /// # Errors
    ///
    /// `LengthMismatch` if the body length differs from the header,
    /// `PayloadTooLarge` past the size limit, `Json` if a finished envelope
    /// does not parse.
    pub fn on_receive(&mut self, header: &Header, chunk: &[u8]) -> Result<Option<Assembled>> {
        let expected = header.payload_length as usize;
        if chunk.len() != expected {
            return Err(StreamingError::LengthMismatch {
                expected,
                actual: chunk.len(),
            });
        }

        let total = self.received + chunk.len();
        if total > self.max_payload_size {
            return Err(StreamingError::PayloadTooLarge {
                size: total,
                max: self.max_payload_size,
            });
        }

        let stream = self.get_payload_stream();
        stream.write(chunk)?;
        self.received = total;
        self.end = header.end;

        if !header.end {
            return Ok(None);
        }

        stream.end();
        debug!(id = %self.id, payload_type = ?self.payload_type, bytes = total, "payload complete");
        self.finish(&stream).map(Some)
    }

    fn finish(&mut self, stream: &SubscribableStream) -> Result<Assembled> {
        match self.payload_type {
            PayloadType::Request => {
                let bytes = Self::drain(stream)?;
                RequestEnvelope::from_slice(&bytes)
                    .map(Assembled::Request)
                    .inspect_err(|_| self.orphaned = referenced_streams(&bytes))
            }
            PayloadType::Response => {
                let bytes = Self::drain(stream)?;
                ResponseEnvelope::from_slice(&bytes)
                    .map(Assembled::Response)
                    .inspect_err(|_| self.orphaned = referenced_streams(&bytes))
            }
            PayloadType::Stream => Ok(Assembled::Stream),
            PayloadType::CancelAll | PayloadType::CancelStream => Err(StreamingError::Protocol(
                format!("cancel signal {} has no payload", self.id),
            )),
        }
    }

    /// Take the body ids of an envelope that failed to parse.
    pub fn take_orphaned_streams(&mut self) -> Vec<StreamId> {
        std::mem::take(&mut self.orphaned)
    }

    fn drain(stream: &SubscribableStream) -> Result<Bytes> {
        Ok(stream.reader()?.try_read_available())
    }

    /// End the stream and stop assembling.
    pub fn close(&mut self) {
        if let Some(stream) = &self.stream {
            stream.end();
        }
        self.end = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(payload_type: PayloadType, len: u32, end: bool) -> Header {
        Header::new(payload_type, len, StreamId::new(), end)
    }

    #[test]
    fn test_assigns_values_when_constructed() {
        let h = header(PayloadType::Stream, 50, false);
        let assembler = PayloadAssembler::new(&h).unwrap();

        assert_eq!(assembler.id(), h.id);
        assert_eq!(assembler.content_length(), 50);
        assert_eq!(assembler.payload_type(), PayloadType::Stream);
        assert!(!assembler.end());
    }

    #[test]
    fn test_missing_id() {
        let h = Header::new(PayloadType::Request, 5, StreamId::nil(), true);
        let err = PayloadAssembler::new(&h).unwrap_err();
        assert_eq!(err.to_string(), "An ID must be supplied");
    }

    #[test]
    fn test_stream_can_be_created_and_closed() {
        let h = header(PayloadType::Stream, 50, true);
        let mut assembler = PayloadAssembler::new(&h).unwrap();

        let fresh = assembler.create_payload_stream();
        assert!(fresh.reader().is_ok());

        let stream = assembler.get_payload_stream();
        assembler.close();
        assembler.close();
        assert!(stream.is_ended());
    }

    #[test]
    fn test_request_envelope_completes() {
        let body = br#"{"verb":"POST","path":"/some/path"}"#;
        let h = header(PayloadType::Request, body.len() as u32, true);
        let mut assembler = PayloadAssembler::new(&h).unwrap();

        match assembler.on_receive(&h, body).unwrap() {
            Some(Assembled::Request(envelope)) => {
                assert_eq!(envelope.verb, "POST");
                assert_eq!(envelope.path, "/some/path");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_response_envelope_over_two_frames() {
        let body = br#"{"statusCode":200}"#;
        let id = StreamId::new();
        let first = Header::new(PayloadType::Response, 10, id, false);
        let last = Header::new(PayloadType::Response, (body.len() - 10) as u32, id, true);
        let mut assembler = PayloadAssembler::new(&first).unwrap();

        assert!(assembler.on_receive(&first, &body[..10]).unwrap().is_none());
        match assembler.on_receive(&last, &body[10..]).unwrap() {
            Some(Assembled::Response(envelope)) => assert_eq!(envelope.status_code, 200),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(assembler.received(), body.len());
    }

    #[tokio::test]
    async fn test_stream_payload_stays_in_stream() {
        let h = header(PayloadType::Stream, 5, true);
        let shared = SubscribableStream::new();
        let mut reader = shared.reader().unwrap();
        let mut assembler = PayloadAssembler::with_stream(&h, shared.clone()).unwrap();

        assert!(matches!(
            assembler.on_receive(&h, b"12345").unwrap(),
            Some(Assembled::Stream)
        ));
        assert_eq!(&reader.read_to_end().await.unwrap()[..], b"12345");
    }

    #[test]
    fn test_invalid_envelope_is_json_error() {
        let h = header(PayloadType::Request, 5, true);
        let mut assembler = PayloadAssembler::new(&h).unwrap();

        let err = assembler.on_receive(&h, b"12345").unwrap_err();
        assert!(matches!(err, StreamingError::Json(_)));
        assert!(!err.is_fatal());
        assert!(assembler.take_orphaned_streams().is_empty());
    }

    #[test]
    fn test_invalid_envelope_keeps_body_ids() {
        let body = StreamId::new();
        let text = format!(r#"{{"statusCode":"bad","streams":[{{"id":"{body}"}}]}}"#);
        let h = header(PayloadType::Response, text.len() as u32, true);
        let mut assembler = PayloadAssembler::new(&h).unwrap();

        assert!(assembler.on_receive(&h, text.as_bytes()).is_err());
        assert_eq!(assembler.take_orphaned_streams(), vec![body]);
        assert!(assembler.take_orphaned_streams().is_empty());
    }

    #[test]
    fn test_length_mismatch() {
        let h = header(PayloadType::Stream, 10, true);
        let mut assembler = PayloadAssembler::new(&h).unwrap();

        assert!(matches!(
            assembler.on_receive(&h, b"short"),
            Err(StreamingError::LengthMismatch {
                expected: 10,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_payload_too_large() {
        let h = header(PayloadType::Stream, 8, false);
        let mut assembler = PayloadAssembler::new(&h).unwrap().max_payload_size(12);

        assert!(assembler.on_receive(&h, b"01234567").unwrap().is_none());
        assert!(matches!(
            assembler.on_receive(&h, b"01234567"),
            Err(StreamingError::PayloadTooLarge { size: 16, max: 12 })
        ));
    }
}
