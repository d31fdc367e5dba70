use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{decode_as, to_value, Codec, CodecError};

/// Wire wrapper for every pub/sub message.
///
/// `event` drives subscriber-side filtering and must survive the round trip
/// byte for byte; `source` names the publishing application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(event: impl Into<String>, source: impl Into<String>, payload: T) -> Self {
        Self {
            event: event.into(),
            source: source.into(),
            payload,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn encode(&self, codec: &dyn Codec) -> Result<String, CodecError> {
        codec.encode(&to_value(self)?)
    }
}

impl Envelope<Value> {
    pub fn decode(codec: &dyn Codec, raw: &str) -> Result<Self, CodecError> {
        decode_as(codec, raw)
    }

    /// Convert the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
