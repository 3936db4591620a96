//! MsgPack codec using `rmp-serde`.
//!
//! Structs are written with `to_vec_named` so they travel as maps keyed by
//! field name. A peer decoding with a dynamic MessagePack library sees the
//! same shape it would get from the JSON body of the same value.
//!
//! # Example
//!
//! ```
//! use streamwire::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Attachment {
//!     name: String,
//!     size: u32,
//! }
//!
//! let value = Attachment { name: "card.json".to_string(), size: 42 };
//! let encoded = MsgPackCodec::encode(&value).unwrap();
//! let decoded: Attachment = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, value);
//! ```

use crate::error::Result;

/// MessagePack codec for structured bodies.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes in struct-as-map format.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        // to_vec would write structs as positional arrays.
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamingError;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Conversation {
        id: u32,
        name: String,
        active: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Conversation {
            id: 42,
            name: "general".to_string(),
            active: true,
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Conversation = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_is_written_as_map() {
        let value = Conversation {
            id: 1,
            name: "x".to_string(),
            active: false,
        };

        let encoded = MsgPackCodec::encode(&value).unwrap();

        // fixmap with 3 entries; a positional array would be 0x93
        assert_eq!(encoded[0], 0x83);
    }

    #[test]
    fn test_encode_decode_nested() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Members {
            conversation: Conversation,
            users: Vec<String>,
        }

        let original = Members {
            conversation: Conversation {
                id: 7,
                name: "team".to_string(),
                active: true,
            },
            users: vec!["a".to_string(), "b".to_string()],
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Members = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_none_is_nil() {
        let val: Option<i32> = None;
        let encoded = MsgPackCodec::encode(&val).unwrap();
        assert_eq!(encoded, vec![0xc0]);

        let decoded: Option<i32> = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Conversation> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(StreamingError::MsgPackDecode(_))));
    }
}
