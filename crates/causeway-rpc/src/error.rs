// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for request/response exchanges.

use causeway_channel::ChannelError;
use serde_json::Value;
use thiserror::Error;

/// Everything that can go wrong on one exchange, from the caller's side.
///
/// The variants draw the lines a caller actually needs: is the transport
/// gone, did the peer break the wire contract, did the upstream handler
/// fail, or was the exchange cancelled on purpose.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// The underlying channel closed before the exchange finished.
    #[error("transport gone before the exchange finished")]
    TransportGone,

    /// The peer sent something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The remote handler reported a failure with this payload.
    #[error("upstream error: {0}")]
    Upstream(Value),

    /// The exchange was cancelled, locally or by the peer.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// Structured reason carried with the cancellation.
        reason: Value,
    },
}

impl RpcError {
    /// Converts the error into a payload suitable for an error envelope.
    ///
    /// Upstream failures keep their original payload; every other variant
    /// is rendered through its display form.
    #[must_use]
    pub fn into_payload(self) -> Value {
        match self {
            RpcError::Upstream(payload) => payload,
            other => Value::from(other.to_string()),
        }
    }
}

impl From<ChannelError> for RpcError {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::TransportClosed => RpcError::TransportGone,
            ChannelError::Malformed(_) => RpcError::Protocol(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_protocol::ProtocolError;
    use serde_json::json;

    #[test]
    fn upstream_payload_survives_conversion() {
        let error = RpcError::Upstream(json!({"code": 42}));
        assert_eq!(error.into_payload(), json!({"code": 42}));
    }

    #[test]
    fn other_variants_render_as_strings() {
        let payload = RpcError::TransportGone.into_payload();
        assert_eq!(
            payload,
            Value::from("transport gone before the exchange finished")
        );
    }

    #[test]
    fn channel_errors_map_onto_the_taxonomy() {
        assert_eq!(
            RpcError::from(ChannelError::TransportClosed),
            RpcError::TransportGone
        );
        let malformed = ChannelError::Malformed(ProtocolError::Decode(
            serde_json::from_value::<u32>(json!("nope")).unwrap_err(),
        ));
        assert!(matches!(RpcError::from(malformed), RpcError::Protocol(_)));
    }
}
