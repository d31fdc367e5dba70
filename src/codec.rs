//! Wire codec for cached values and pub/sub envelopes.
//!
//! The codec works on `serde_json::Value`; the typed helpers convert to and
//! from the caller's types so a schema change surfaces as a decode error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Stored in place of a cached null result. Distinct from "absent".
pub const NULL_MARKER: &str = "null";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Decode failed: {0}")]
    Decode(String),
}

pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<String, CodecError>;
    fn decode(&self, raw: &str) -> Result<Value, CodecError>;
}

/// Compact JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<Value, CodecError> {
        serde_json::from_str(raw).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Serialize into the evaluator/codec value model.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CodecError> {
    serde_json::to_value(value).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn encode_as<T: Serialize + ?Sized>(codec: &dyn Codec, value: &T) -> Result<String, CodecError> {
    codec.encode(&to_value(value)?)
}

/// Decode into the target shape `T`.
pub fn decode_as<T: DeserializeOwned>(codec: &dyn Codec, raw: &str) -> Result<T, CodecError> {
    let value = codec.decode(raw)?;
    serde_json::from_value(value).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
        name: String,
    }

    #[test]
    fn test_typed_encode_decode() {
        let user = User { id: "u-1".into(), name: "Chiwa".into() };
        let raw = encode_as(&JsonCodec, &user).unwrap();
        assert_eq!(raw, r#"{"id":"u-1","name":"Chiwa"}"#);
        assert_eq!(decode_as::<User>(&JsonCodec, &raw).unwrap(), user);
    }

    #[test]
    fn test_schema_drift_is_a_decode_error() {
        let err = decode_as::<User>(&JsonCodec, r#"{"id":"u-1"}"#).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(JsonCodec.decode("{not json"), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_non_string_map_keys_fail_to_encode() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], 1);
        assert!(matches!(encode_as(&JsonCodec, &map), Err(CodecError::Encode(_))));
    }

    #[test]
    fn test_null_marker_matches_json_null() {
        assert_eq!(JsonCodec.encode(&json!(null)).unwrap(), NULL_MARKER);
    }
}
