// SPDX-License-Identifier: MIT OR Apache-2.0
//! Channel adapter errors.

use causeway_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by a channel adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying transport is closed or has no remote end.
    #[error("transport closed")]
    TransportClosed,

    /// An envelope could not be translated to or from the wire.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] ProtocolError),
}
