// SPDX-License-Identifier: MIT OR Apache-2.0
//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while translating envelopes to or from transport values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An envelope could not be serialized for the wire.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// A transport value did not decode as a protocol envelope.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}
