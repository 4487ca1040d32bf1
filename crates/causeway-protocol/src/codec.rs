// SPDX-License-Identifier: MIT OR Apache-2.0
//! Conversion between typed envelopes and raw transport values.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::ProtocolError;

/// Encodes and decodes protocol messages as [`serde_json::Value`]s.
///
/// Causeway transports carry discrete `Value` messages; this codec is the
/// single point where the typed envelope enums meet that wire shape.
pub struct ValueCodec;

impl ValueCodec {
    /// Encode a message into a transport value.
    pub fn encode<T: Serialize>(message: &T) -> Result<Value, ProtocolError> {
        serde_json::to_value(message).map_err(ProtocolError::Encode)
    }

    /// Decode a transport value into a typed message.
    pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ProtocolError> {
        serde_json::from_value(value).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{RequestEnvelope, ResponseEnvelope};
    use serde_json::json;

    #[test]
    fn encode_decode_round_trip() {
        let env = ResponseEnvelope::StreamMessage {
            request_id: 12,
            payload: json!({"n": 1}),
        };
        let wire = ValueCodec::encode(&env).unwrap();
        let back: ResponseEnvelope = ValueCodec::decode(wire).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn decode_rejects_foreign_message() {
        let err = ValueCodec::decode::<RequestEnvelope>(json!({"hello": "world"})).unwrap_err();
        assert!(err.to_string().contains("decode"));
    }

    #[test]
    fn decode_rejects_non_object() {
        assert!(ValueCodec::decode::<ResponseEnvelope>(json!("close")).is_err());
    }
}
