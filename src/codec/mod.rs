//! Body codecs for attached content streams.
//!
//! - [`JsonCodec`] - `serde_json`, content type `application/json`
//! - [`MsgPackCodec`] - `rmp-serde` with struct-as-map encoding,
//!   content type `application/msgpack`
//!
//! Codecs are marker structs with static methods; the content type travels
//! in the stream description so the receiver knows which one to use.

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

/// Content type of UTF-8 text bodies.
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Content type of JSON bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// Content type of MessagePack bodies.
pub const CONTENT_TYPE_MSGPACK: &str = "application/msgpack";

/// Content type of opaque binary bodies.
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";
