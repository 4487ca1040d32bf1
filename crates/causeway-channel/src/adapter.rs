// SPDX-License-Identifier: MIT OR Apache-2.0
//! The uniform contract between the protocol layer and a transport.
//!
//! `causeway-rpc` is written against these three traits only. Each transport
//! keeps its own on-wire conventions (explicit start envelopes, abort
//! envelopes versus disconnects) behind them.

use async_trait::async_trait;
use serde_json::Value;

use causeway_protocol::{CancelToken, ResponseEnvelope};

use crate::error::ChannelError;

// ---------------------------------------------------------------------------
// Requesting side
// ---------------------------------------------------------------------------

/// Client side of one logical request/response exchange.
///
/// An implementation owns the transport resources for exactly one
/// correlation id: the protocol layer sends one request payload, consumes
/// inbound envelopes until a terminal one arrives, and cancels if its caller
/// gives up first.
#[async_trait]
pub trait RequestChannel: Send {
    /// Correlation id this exchange is keyed by.
    fn request_id(&self) -> u32;

    /// Send the single request envelope opening this exchange.
    async fn send_request(&mut self, payload: Value) -> Result<(), ChannelError>;

    /// Receive the next inbound envelope for this exchange.
    ///
    /// `None` means the transport went away before any response. Adapters
    /// whose transport signals a clean end out of band translate that signal
    /// into a synthetic `close` envelope instead.
    async fn recv(&mut self) -> Option<Result<ResponseEnvelope, ChannelError>>;

    /// Cancel the exchange with the transport's own convention: an explicit
    /// abort envelope, or tearing the raw channel down.
    ///
    /// Envelopes still in flight for this exchange are discarded afterwards.
    async fn cancel(&mut self, reason: Value);
}

// ---------------------------------------------------------------------------
// Serving side
// ---------------------------------------------------------------------------

/// Serving side of a transport: a source of inbound exchanges.
#[async_trait]
pub trait Listener: Send {
    /// The per-request exchange type this listener produces.
    type Exchange: InboundExchange;

    /// Wait for the next inbound exchange, or `None` once the transport
    /// closes.
    async fn accept(&mut self) -> Option<Self::Exchange>;
}

/// Serving side of one logical exchange.
///
/// Terminal sends are idempotent: after `close` or `fail` (or a remote
/// abort) further sends are silently dropped, never errors, so at most one
/// terminal envelope reaches the wire per exchange.
#[async_trait]
pub trait InboundExchange: Send + 'static {
    /// Wait for the request that opens this exchange.
    ///
    /// Returns the correlation id and request payload, or `None` when the
    /// remote goes away without ever sending one. Yields a request at most
    /// once.
    async fn begin(&mut self) -> Option<(u32, Value)>;

    /// Token fired when the remote aborts this exchange or disconnects.
    fn cancel_token(&self) -> CancelToken;

    /// Whether the remote has already walked away from this exchange; a
    /// terminal error envelope is pointless once this is true.
    fn remote_gone(&self) -> bool;

    /// Start the response stream with the transport's own convention: an
    /// explicit `stream-start` envelope, or nothing at all.
    async fn open(&mut self) -> Result<(), ChannelError>;

    /// Send one `stream-message` envelope.
    async fn send(&mut self, payload: Value) -> Result<(), ChannelError>;

    /// Terminate cleanly with the transport's convention for `close`.
    async fn close(&mut self) -> Result<(), ChannelError>;

    /// Terminate with an `error` envelope carrying `payload`.
    async fn fail(&mut self, payload: Value) -> Result<(), ChannelError>;
}
