// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tagged envelope types for the causeway wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-to-server envelope.
///
/// The discriminator tag is `"kind"`, hyphenated on the wire. Payload fields
/// use [`serde_json::Value`] so the protocol layer carries them untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RequestEnvelope {
    /// Opens a new exchange. Exactly one is sent per `request_id`.
    Request {
        /// Correlation id chosen by the requesting side.
        request_id: u32,
        /// Opaque request body.
        payload: Value,
    },
    /// Cancels a pending exchange on transports that multiplex requests.
    Abort {
        /// Correlation id of the exchange being cancelled.
        request_id: u32,
        /// Opaque abort reason.
        payload: Value,
    },
}

impl RequestEnvelope {
    /// Correlation id carried by this envelope.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        match self {
            Self::Request { request_id, .. } | Self::Abort { request_id, .. } => *request_id,
        }
    }

    /// Wire-level kind string.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Abort { .. } => "abort",
        }
    }
}

/// Server-to-client envelope.
///
/// A well-behaved exchange delivers an optional `stream-start`, zero or more
/// `stream-message`s, then exactly one terminal `close` or `error`. Nothing
/// is ever sent for a `request_id` after its terminal envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResponseEnvelope {
    /// Explicit start-of-stream marker, sent only by transports whose
    /// convention includes a start handshake.
    StreamStart {
        /// Correlation id of the exchange being answered.
        request_id: u32,
    },
    /// One response value.
    StreamMessage {
        /// Correlation id of the exchange being answered.
        request_id: u32,
        /// Opaque response value.
        payload: Value,
    },
    /// Terminal failure. The payload is the serving handler's error value,
    /// forwarded without interpretation.
    Error {
        /// Correlation id of the exchange being answered.
        request_id: u32,
        /// Opaque error value.
        payload: Value,
    },
    /// Terminal clean close.
    Close {
        /// Correlation id of the exchange being answered.
        request_id: u32,
    },
}

impl ResponseEnvelope {
    /// Correlation id carried by this envelope.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        match self {
            Self::StreamStart { request_id }
            | Self::StreamMessage { request_id, .. }
            | Self::Error { request_id, .. }
            | Self::Close { request_id } => *request_id,
        }
    }

    /// Wire-level kind string.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StreamStart { .. } => "stream-start",
            Self::StreamMessage { .. } => "stream-message",
            Self::Error { .. } => "error",
            Self::Close { .. } => "close",
        }
    }

    /// Whether this envelope ends its exchange.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Close { .. })
    }
}
