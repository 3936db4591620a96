//! JSON envelopes carried by `Request` and `Response` payloads.
//!
//! Bodies never travel inside an envelope. Each body is sent as its own
//! `Stream` payload and referenced here by id:
//!
//! ```text
//! {"verb":"POST","path":"/api/messages","streams":[{"id":"…","type":"application/json","length":42}]}
//! {"statusCode":200,"streams":[]}
//! ```

use serde::{Deserialize, Serialize};

use super::StreamId;
use crate::error::Result;

/// Reference from an envelope to one attached body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    /// Id of the `Stream` payload carrying the body.
    pub id: StreamId,
    /// Content type of the body.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Total body length in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// Envelope of an outbound or inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub verb: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDescription>,
}

/// Envelope of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamDescription>,
}

impl RequestEnvelope {
    /// Serialize to the UTF-8 JSON body of a `Request` payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a reassembled `Request` payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl ResponseEnvelope {
    /// Serialize to the UTF-8 JSON body of a `Response` payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a reassembled `Response` payload.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Body ids listed by an envelope that did not parse as a whole.
///
/// Reads only the `streams` array; anything unreadable yields no ids.
pub fn referenced_streams(bytes: &[u8]) -> Vec<StreamId> {
    #[derive(Deserialize)]
    struct StreamRef {
        id: StreamId,
    }

    #[derive(Deserialize)]
    struct StreamRefs {
        #[serde(default)]
        streams: Vec<StreamRef>,
    }

    serde_json::from_slice::<StreamRefs>(bytes)
        .map(|refs| refs.streams.into_iter().map(|r| r.id).collect())
        .unwrap_or_default()
}
