// SPDX-License-Identifier: MIT OR Apache-2.0
//! Point-to-point channels: one dedicated raw channel per logical request.
//!
//! The raw transport is a crossed pair of unbounded message queues. It
//! carries no abort and no close envelope; dropping the sending half is both
//! the cancellation signal (requesting side) and the clean-termination
//! signal (serving side), the way a disconnectable one-shot port behaves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use causeway_protocol::{CancelToken, RequestEnvelope, ResponseEnvelope, ValueCodec};

use crate::adapter::{InboundExchange, Listener, RequestChannel};
use crate::error::ChannelError;

// ---------------------------------------------------------------------------
// Raw endpoint
// ---------------------------------------------------------------------------

/// Create a connected connector/listener pair.
///
/// Every [`PortConnector::connect`] call opens a fresh point-to-point
/// channel whose far end pops out of the listener.
pub fn port_endpoint() -> (PortConnector, PortListener) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (
        PortConnector {
            accept_tx,
            next_id: Arc::new(AtomicU32::new(1)),
        },
        PortListener { accept_rx },
    )
}

/// Opens point-to-point channels toward the matching [`PortListener`].
#[derive(Debug, Clone)]
pub struct PortConnector {
    accept_tx: mpsc::UnboundedSender<PortEnd>,
    next_id: Arc<AtomicU32>,
}

impl PortConnector {
    /// Open one channel and wrap the near end for a single exchange.
    ///
    /// The correlation id comes off a counter shared by all clones of this
    /// connector, so ids never repeat within the endpoint's lifetime.
    pub fn connect(&self) -> Result<PortChannel, ChannelError> {
        let (near, far) = PortEnd::pair();
        self.accept_tx
            .send(far)
            .map_err(|_| ChannelError::TransportClosed)?;
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(PortChannel::new(near, request_id))
    }
}

/// Accepts the far ends of channels opened by a [`PortConnector`].
#[derive(Debug)]
pub struct PortListener {
    accept_rx: mpsc::UnboundedReceiver<PortEnd>,
}

#[async_trait]
impl Listener for PortListener {
    type Exchange = PortInbound;

    async fn accept(&mut self) -> Option<PortInbound> {
        self.accept_rx.recv().await.map(PortInbound::new)
    }
}

/// One end of a raw point-to-point message channel.
///
/// The only disconnect signal this transport carries is dropping the end
/// that sends: the peer then reads `None` once the queue drains.
#[derive(Debug)]
pub struct PortEnd {
    tx: mpsc::UnboundedSender<Value>,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl PortEnd {
    /// Create a connected pair of ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self { tx: a_tx, rx: b_rx }, Self { tx: b_tx, rx: a_rx })
    }

    /// Send one raw message to the peer.
    pub fn send(&self, message: Value) -> Result<(), ChannelError> {
        self.tx
            .send(message)
            .map_err(|_| ChannelError::TransportClosed)
    }

    /// Receive the next raw message; `None` once the peer is gone and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    fn split(self) -> (mpsc::UnboundedSender<Value>, mpsc::UnboundedReceiver<Value>) {
        (self.tx, self.rx)
    }
}

// ---------------------------------------------------------------------------
// Requesting side
// ---------------------------------------------------------------------------

/// Client adapter: one request/response exchange over a dedicated port.
///
/// Single-use. Cancellation drops the raw channel instead of sending an
/// abort envelope, and a remote disconnect after the stream has begun is
/// reported as a synthetic `close`.
#[derive(Debug)]
pub struct PortChannel {
    request_id: u32,
    end: Option<PortEnd>,
    seen_any: bool,
}

impl PortChannel {
    /// Wrap a raw end for the exchange keyed by `request_id`.
    #[must_use]
    pub fn new(end: PortEnd, request_id: u32) -> Self {
        Self {
            request_id,
            end: Some(end),
            seen_any: false,
        }
    }
}

#[async_trait]
impl RequestChannel for PortChannel {
    fn request_id(&self) -> u32 {
        self.request_id
    }

    async fn send_request(&mut self, payload: Value) -> Result<(), ChannelError> {
        let envelope = RequestEnvelope::Request {
            request_id: self.request_id,
            payload,
        };
        let raw = ValueCodec::encode(&envelope).map_err(ChannelError::Malformed)?;
        match &self.end {
            Some(end) => end.send(raw),
            None => Err(ChannelError::TransportClosed),
        }
    }

    async fn recv(&mut self) -> Option<Result<ResponseEnvelope, ChannelError>> {
        loop {
            let end = self.end.as_mut()?;
            match end.recv().await {
                Some(raw) => match ValueCodec::decode::<ResponseEnvelope>(raw) {
                    Ok(envelope) if envelope.request_id() != self.request_id => {
                        warn!(
                            target: "causeway.port",
                            request_id = envelope.request_id(),
                            "dropping envelope for foreign request"
                        );
                    }
                    Ok(envelope) => {
                        self.seen_any = true;
                        if envelope.is_terminal() {
                            // At most one terminal envelope per exchange; a
                            // later raw disconnect must not add a synthetic
                            // close on top.
                            self.end = None;
                        }
                        return Some(Ok(envelope));
                    }
                    Err(error) => return Some(Err(ChannelError::Malformed(error))),
                },
                None => {
                    // A disconnect before any envelope means no response at
                    // all; after the stream has begun it is this transport's
                    // clean end-of-stream.
                    let started = self.seen_any;
                    self.end = None;
                    return started.then(|| {
                        Ok(ResponseEnvelope::Close {
                            request_id: self.request_id,
                        })
                    });
                }
            }
        }
    }

    async fn cancel(&mut self, _reason: Value) {
        self.end = None;
    }
}

// ---------------------------------------------------------------------------
// Serving side
// ---------------------------------------------------------------------------

/// Serving adapter for one accepted port.
///
/// A watcher task owns the receive half: it hands the opening request to
/// [`InboundExchange::begin`] and fires the cancel token when the remote
/// disconnects or aborts.
#[derive(Debug)]
pub struct PortInbound {
    tx: Option<mpsc::UnboundedSender<Value>>,
    request_rx: Option<oneshot::Receiver<(u32, Value)>>,
    token: CancelToken,
    gone: Arc<AtomicBool>,
    request_id: u32,
    done: bool,
    watcher: JoinHandle<()>,
}

impl PortInbound {
    fn new(end: PortEnd) -> Self {
        let (tx, mut rx) = end.split();
        let (request_tx, request_rx) = oneshot::channel();
        let token = CancelToken::new();
        let gone = Arc::new(AtomicBool::new(false));

        let watcher = tokio::spawn({
            let token = token.clone();
            let gone = Arc::clone(&gone);
            async move {
                let mut request_tx = Some(request_tx);
                loop {
                    match rx.recv().await {
                        Some(raw) => match ValueCodec::decode::<RequestEnvelope>(raw) {
                            Ok(RequestEnvelope::Request {
                                request_id,
                                payload,
                            }) => {
                                if let Some(request_tx) = request_tx.take() {
                                    let _ = request_tx.send((request_id, payload));
                                } else {
                                    warn!(
                                        target: "causeway.port",
                                        request_id,
                                        "dropping extra request on single-use port"
                                    );
                                }
                            }
                            Ok(RequestEnvelope::Abort { payload, .. }) => {
                                gone.store(true, Ordering::SeqCst);
                                token.cancel(payload);
                            }
                            Err(error) => {
                                warn!(
                                    target: "causeway.port",
                                    %error,
                                    "dropping malformed envelope"
                                );
                            }
                        },
                        None => {
                            gone.store(true, Ordering::SeqCst);
                            token.cancel(Value::from("port disconnected"));
                            break;
                        }
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            request_rx: Some(request_rx),
            token,
            gone,
            request_id: 0,
            done: false,
            watcher,
        }
    }

    fn push(&self, envelope: &ResponseEnvelope) -> Result<(), ChannelError> {
        let raw = ValueCodec::encode(envelope).map_err(ChannelError::Malformed)?;
        match &self.tx {
            Some(tx) => tx.send(raw).map_err(|_| ChannelError::TransportClosed),
            None => Err(ChannelError::TransportClosed),
        }
    }
}

#[async_trait]
impl InboundExchange for PortInbound {
    async fn begin(&mut self) -> Option<(u32, Value)> {
        let request_rx = self.request_rx.take()?;
        let (request_id, payload) = request_rx.await.ok()?;
        self.request_id = request_id;
        Some((request_id, payload))
    }

    fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    fn remote_gone(&self) -> bool {
        self.gone.load(Ordering::SeqCst)
    }

    async fn open(&mut self) -> Result<(), ChannelError> {
        if self.done {
            return Ok(());
        }
        self.push(&ResponseEnvelope::StreamStart {
            request_id: self.request_id,
        })
    }

    async fn send(&mut self, payload: Value) -> Result<(), ChannelError> {
        if self.done {
            return Ok(());
        }
        self.push(&ResponseEnvelope::StreamMessage {
            request_id: self.request_id,
            payload,
        })
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        // Dropping the send half is this transport's close envelope.
        self.tx = None;
        Ok(())
    }

    async fn fail(&mut self, payload: Value) -> Result<(), ChannelError> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        let sent = self.push(&ResponseEnvelope::Error {
            request_id: self.request_id,
            payload,
        });
        self.tx = None;
        sent
    }
}

impl Drop for PortInbound {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
