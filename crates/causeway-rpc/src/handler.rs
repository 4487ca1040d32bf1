// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handler seam between [`serve`](crate::server::serve) and application code.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;

use causeway_channel::PortConnector;
use causeway_protocol::CancelToken;

use crate::client::request;
use crate::error::RpcError;

/// Lazy sequence of response values produced by a handler.
///
/// `Ok` items become `stream-message` envelopes; the first `Err` item
/// terminates the exchange with an `error` envelope carrying its payload.
pub type HandlerStream = Pin<Box<dyn Stream<Item = Result<Value, Value>> + Send>>;

/// Application hook invoked once per inbound request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response stream for one request.
    ///
    /// Returning `Err` fails the exchange before any stream output. The
    /// token fires when the requester aborts or its transport goes away;
    /// handlers should stop promptly, though the protocol layer stops
    /// forwarding their output either way.
    async fn handle(&self, payload: Value, token: CancelToken) -> Result<HandlerStream, Value>;
}

/// Wrap a plain async closure as a [`RequestHandler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Value, CancelToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerStream, Value>> + Send,
{
    HandlerFn { f }
}

/// [`RequestHandler`] backed by a closure; built with [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RequestHandler for HandlerFn<F>
where
    F: Fn(Value, CancelToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerStream, Value>> + Send,
{
    async fn handle(&self, payload: Value, token: CancelToken) -> Result<HandlerStream, Value> {
        (self.f)(payload, token).await
    }
}

/// Handler that relays every request over a fresh point-to-point port.
///
/// Bridges transports: accept requests on one listener (typically a bus)
/// and re-issue each on its own port channel, passing the cancellation
/// token straight through so aborts reach the far side.
#[derive(Debug, Clone)]
pub struct PortForwarder {
    connector: PortConnector,
}

impl PortForwarder {
    /// Forward requests through `connector`.
    #[must_use]
    pub fn new(connector: PortConnector) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl RequestHandler for PortForwarder {
    async fn handle(&self, payload: Value, token: CancelToken) -> Result<HandlerStream, Value> {
        let channel = self
            .connector
            .connect()
            .map_err(|error| RpcError::from(error).into_payload())?;
        let responses = request(channel, payload, token)
            .await
            .map_err(RpcError::into_payload)?;
        Ok(Box::pin(
            responses.map(|item| item.map_err(RpcError::into_payload)),
        ))
    }
}
