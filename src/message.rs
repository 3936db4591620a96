//! Application-facing request and response types.
//!
//! Outbound messages ([`StreamingRequest`], [`StreamingResponse`]) own their
//! bodies as [`HttpContent`]. Inbound messages ([`ReceiveRequest`],
//! [`ReceiveResponse`]) carry [`ContentStream`]s that fill up as the
//! matching `Stream` payloads arrive.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{
    JsonCodec, MsgPackCodec, CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON, CONTENT_TYPE_MSGPACK,
    CONTENT_TYPE_TEXT,
};
use crate::error::{Result, StreamingError};
use crate::protocol::StreamId;
use crate::stream::{StreamReader, SubscribableStream};

/// One outbound body with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpContent {
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpContent {
    /// Create a body with an explicit content type.
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }

    /// UTF-8 text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(CONTENT_TYPE_TEXT, text.into())
    }

    /// JSON body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new(CONTENT_TYPE_JSON, JsonCodec::encode(value)?))
    }

    /// MessagePack body.
    pub fn msgpack<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::new(CONTENT_TYPE_MSGPACK, MsgPackCodec::encode(value)?))
    }

    /// Opaque binary body.
    pub fn binary(body: impl Into<Bytes>) -> Self {
        Self::new(CONTENT_TYPE_BINARY, body)
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Check if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingRequest {
    pub verb: String,
    pub path: String,
    pub streams: Vec<HttpContent>,
}

impl StreamingRequest {
    /// Create a request with no bodies.
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            streams: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new("PUT", path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("DELETE", path)
    }

    /// Attach a body stream.
    pub fn add_stream(&mut self, content: HttpContent) -> &mut Self {
        self.streams.push(content);
        self
    }

    /// Attach a UTF-8 text body.
    pub fn set_body_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.add_stream(HttpContent::text(text))
    }

    /// Attach a JSON body.
    pub fn set_body_json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self> {
        Ok(self.add_stream(HttpContent::json(value)?))
    }

    /// Attach a MessagePack body.
    pub fn set_body_msgpack<T: Serialize>(&mut self, value: &T) -> Result<&mut Self> {
        Ok(self.add_stream(HttpContent::msgpack(value)?))
    }
}

/// Outbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingResponse {
    pub status_code: u16,
    pub streams: Vec<HttpContent>,
}

impl StreamingResponse {
    /// Create a response with no bodies.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            streams: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(405)
    }

    pub fn internal_error() -> Self {
        Self::new(500)
    }

    pub fn service_unavailable() -> Self {
        Self::new(503)
    }

    /// Attach a body stream.
    pub fn add_stream(&mut self, content: HttpContent) -> &mut Self {
        self.streams.push(content);
        self
    }

    /// Attach a UTF-8 text body.
    pub fn set_body_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.add_stream(HttpContent::text(text))
    }

    /// Attach a JSON body.
    pub fn set_body_json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self> {
        Ok(self.add_stream(HttpContent::json(value)?))
    }

    /// Attach a MessagePack body.
    pub fn set_body_msgpack<T: Serialize>(&mut self, value: &T) -> Result<&mut Self> {
        Ok(self.add_stream(HttpContent::msgpack(value)?))
    }

    /// Shorthand for a 200 response carrying one text body.
    pub fn with_text(text: impl Into<String>) -> Self {
        let mut response = Self::ok();
        response.set_body_text(text);
        response
    }
}

/// Inbound body, filled by the receive task as `Stream` frames arrive.
#[derive(Debug, Clone)]
pub struct ContentStream {
    pub id: StreamId,
    pub content_type: Option<String>,
    pub length: Option<usize>,
    stream: SubscribableStream,
}

impl ContentStream {
    pub(crate) fn new(
        id: StreamId,
        content_type: Option<String>,
        length: Option<usize>,
        stream: SubscribableStream,
    ) -> Self {
        Self {
            id,
            content_type,
            length,
            stream,
        }
    }

    /// Take the single reader of this body.
    ///
    /// # Errors
    ///
    /// `ReaderTaken` if the body was already read.
    pub fn reader(&self) -> Result<StreamReader> {
        self.stream.reader()
    }

    /// Wait for the whole body.
    pub async fn read_bytes(&self) -> Result<Bytes> {
        self.reader()?.read_to_end().await
    }

    /// Wait for the whole body and decode it as UTF-8.
    pub async fn read_as_string(&self) -> Result<String> {
        let bytes = self.read_bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StreamingError::Protocol(format!("body is not UTF-8: {e}")))
    }

    /// Wait for the whole body and decode it as JSON.
    pub async fn read_as_json<T: DeserializeOwned>(&self) -> Result<T> {
        JsonCodec::decode(&self.read_bytes().await?)
    }

    /// Wait for the whole body and decode it as MessagePack.
    pub async fn read_as_msgpack<T: DeserializeOwned>(&self) -> Result<T> {
        MsgPackCodec::decode(&self.read_bytes().await?)
    }
}

/// Inbound request handed to a [`RequestHandler`](crate::handler::RequestHandler).
#[derive(Debug, Clone)]
pub struct ReceiveRequest {
    /// Id of the exchange; the response is sent under the same id.
    pub id: StreamId,
    pub verb: String,
    pub path: String,
    pub streams: Vec<ContentStream>,
}

impl ReceiveRequest {
    /// First attached body, if any.
    pub fn body(&self) -> Option<&ContentStream> {
        self.streams.first()
    }
}

/// Inbound response to a request this side sent.
#[derive(Debug, Clone)]
pub struct ReceiveResponse {
    pub status_code: u16,
    pub streams: Vec<ContentStream>,
}

impl ReceiveResponse {
    /// First attached body, if any.
    pub fn body(&self) -> Option<&ContentStream> {
        self.streams.first()
    }

    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Activity {
        text: String,
    }

    fn filled(bytes: &[u8], content_type: &str) -> ContentStream {
        let stream = SubscribableStream::new();
        stream.write(bytes).unwrap();
        stream.end();
        ContentStream::new(
            StreamId::new(),
            Some(content_type.to_string()),
            Some(bytes.len()),
            stream,
        )
    }

    #[test]
    fn test_request_builders() {
        let mut request = StreamingRequest::post("/api/messages");
        request.set_body_text("hi");
        request
            .set_body_json(&Activity { text: "x".into() })
            .unwrap();

        assert_eq!(request.verb, "POST");
        assert_eq!(request.streams.len(), 2);
        assert_eq!(request.streams[0].content_type.as_deref(), Some(CONTENT_TYPE_TEXT));
        assert_eq!(&request.streams[1].body[..], br#"{"text":"x"}"#);
        assert_eq!(StreamingRequest::delete("/").verb, "DELETE");
    }

    #[test]
    fn test_response_builders() {
        assert_eq!(StreamingResponse::not_found().status_code, 404);
        assert_eq!(StreamingResponse::internal_error().status_code, 500);

        let response = StreamingResponse::with_text("done");
        assert_eq!(response.status_code, 200);
        assert_eq!(&response.streams[0].body[..], b"done");
    }

    #[tokio::test]
    async fn test_content_stream_reads() {
        let text = filled(b"hello", CONTENT_TYPE_TEXT);
        assert_eq!(text.read_as_string().await.unwrap(), "hello");
        assert!(matches!(text.read_bytes().await, Err(StreamingError::ReaderTaken)));

        let json = filled(br#"{"text":"a"}"#, CONTENT_TYPE_JSON);
        let activity: Activity = json.read_as_json().await.unwrap();
        assert_eq!(activity.text, "a");

        let encoded = MsgPackCodec::encode(&Activity { text: "b".into() }).unwrap();
        let packed = filled(&encoded, CONTENT_TYPE_MSGPACK);
        let activity: Activity = packed.read_as_msgpack().await.unwrap();
        assert_eq!(activity.text, "b");
    }

    #[tokio::test]
    async fn test_invalid_utf8_body() {
        let body = filled(&[0xff, 0xfe], CONTENT_TYPE_BINARY);
        assert!(matches!(
            body.read_as_string().await,
            Err(StreamingError::Protocol(_))
        ));
    }
}
