// SPDX-License-Identifier: MIT OR Apache-2.0
//! Multiplexed channels: many concurrent exchanges over one shared bus.
//!
//! Envelopes for every in-flight exchange travel the same two broadcast
//! directions and are correlated by request id. Cancellation is an explicit
//! abort envelope; the correlation-table entry is removed before the abort
//! is published, so envelopes still in flight for a cancelled id are
//! dropped, not misdelivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use causeway_protocol::{CancelToken, RequestEnvelope, ResponseEnvelope, ValueCodec};

use crate::adapter::{InboundExchange, Listener, RequestChannel};
use crate::error::ChannelError;

/// Default capacity of each broadcast direction.
const DEFAULT_CAPACITY: usize = 256;

type CorrelationTable = Arc<Mutex<HashMap<u32, mpsc::UnboundedSender<ResponseEnvelope>>>>;

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// In-memory broadcast bus carrying raw envelope values in both directions.
///
/// Cloning yields another handle onto the same bus. Correlation ids come off
/// a counter shared by all handles, so every exchange opened anywhere on the
/// bus gets a distinct id. Slow subscribers may lag and lose messages, which
/// the adapters log.
#[derive(Debug, Clone)]
pub struct EventBus {
    name: Arc<str>,
    requests: broadcast::Sender<Value>,
    responses: broadcast::Sender<Value>,
    next_id: Arc<AtomicU32>,
}

impl EventBus {
    /// Create a bus with the default per-direction capacity.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    /// Create a bus whose broadcast directions buffer `capacity` messages.
    #[must_use]
    pub fn with_capacity(name: &str, capacity: usize) -> Self {
        let (requests, _) = broadcast::channel(capacity.max(1));
        let (responses, _) = broadcast::channel(capacity.max(1));
        Self {
            name: Arc::from(name),
            requests,
            responses,
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Name used in log lines about this bus.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a requesting-side multiplexer on this bus.
    #[must_use]
    pub fn client(&self) -> BusChannel {
        BusChannel::new(self)
    }

    /// Create a serving-side listener on this bus.
    #[must_use]
    pub fn listener(&self) -> BusListener {
        BusListener {
            name: Arc::clone(&self.name),
            requests: self.requests.subscribe(),
            responses: self.responses.clone(),
            aborts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish a raw value on the request direction, as a client would.
    pub fn publish_request(&self, value: Value) {
        let _ = self.requests.send(value);
    }

    /// Publish a raw value on the response direction, as a server would.
    pub fn publish_response(&self, value: Value) {
        let _ = self.responses.send(value);
    }

    /// Subscribe to the raw request direction.
    #[must_use]
    pub fn subscribe_requests(&self) -> broadcast::Receiver<Value> {
        self.requests.subscribe()
    }

    /// Subscribe to the raw response direction.
    #[must_use]
    pub fn subscribe_responses(&self) -> broadcast::Receiver<Value> {
        self.responses.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Requesting side
// ---------------------------------------------------------------------------

/// Requesting-side multiplexer.
///
/// A background dispatch task owns the bus subscription and routes each
/// inbound response envelope to the exchange whose id it carries; terminal
/// envelopes also retire the correlation-table entry. Dropping the channel
/// aborts the task and fails any still-pending exchanges.
#[derive(Debug)]
pub struct BusChannel {
    requests: broadcast::Sender<Value>,
    next_id: Arc<AtomicU32>,
    table: CorrelationTable,
    dispatch: JoinHandle<()>,
}

impl BusChannel {
    fn new(bus: &EventBus) -> Self {
        let table: CorrelationTable = Arc::new(Mutex::new(HashMap::new()));
        let dispatch = tokio::spawn(dispatch_responses(
            Arc::clone(&bus.name),
            bus.responses.subscribe(),
            Arc::clone(&table),
        ));
        Self {
            requests: bus.requests.clone(),
            next_id: Arc::clone(&bus.next_id),
            table,
            dispatch,
        }
    }

    /// Allocate an exchange keyed by the next correlation id.
    #[must_use]
    pub fn open_request(&self) -> BusRequest {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        BusRequest {
            request_id,
            requests: self.requests.clone(),
            table: Arc::clone(&self.table),
            pending: Some(tx),
            rx,
        }
    }
}

impl Drop for BusChannel {
    fn drop(&mut self) {
        self.dispatch.abort();
        if let Ok(mut table) = self.table.lock() {
            table.clear();
        }
    }
}

async fn dispatch_responses(
    name: Arc<str>,
    mut responses: broadcast::Receiver<Value>,
    table: CorrelationTable,
) {
    loop {
        match responses.recv().await {
            Ok(raw) => match ValueCodec::decode::<ResponseEnvelope>(raw) {
                Ok(envelope) => {
                    let request_id = envelope.request_id();
                    let entry = {
                        let mut table = table.lock().expect("correlation table lock poisoned");
                        if envelope.is_terminal() {
                            table.remove(&request_id)
                        } else {
                            table.get(&request_id).cloned()
                        }
                    };
                    match entry {
                        Some(tx) => {
                            let _ = tx.send(envelope);
                        }
                        None => {
                            debug!(
                                target: "causeway.bus",
                                bus = %name,
                                request_id,
                                "dropping envelope for unknown request"
                            );
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        target: "causeway.bus",
                        bus = %name,
                        %error,
                        "dropping undecodable envelope"
                    );
                }
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(
                    target: "causeway.bus",
                    bus = %name,
                    missed,
                    "response subscriber lagging"
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    // The bus is gone; pending exchanges read end-of-channel from here on.
    if let Ok(mut table) = table.lock() {
        table.clear();
    }
}

/// Client side of one bus exchange.
///
/// Created by [`BusChannel::open_request`]. `send_request` installs the
/// correlation-table entry immediately before publishing, displacing any
/// older entry under the same id; the entry is retired by a terminal
/// envelope, by `cancel`, or on drop.
#[derive(Debug)]
pub struct BusRequest {
    request_id: u32,
    requests: broadcast::Sender<Value>,
    table: CorrelationTable,
    pending: Option<mpsc::UnboundedSender<ResponseEnvelope>>,
    rx: mpsc::UnboundedReceiver<ResponseEnvelope>,
}

#[async_trait]
impl RequestChannel for BusRequest {
    fn request_id(&self) -> u32 {
        self.request_id
    }

    async fn send_request(&mut self, payload: Value) -> Result<(), ChannelError> {
        let envelope = RequestEnvelope::Request {
            request_id: self.request_id,
            payload,
        };
        let raw = ValueCodec::encode(&envelope).map_err(ChannelError::Malformed)?;
        if let Some(tx) = self.pending.take() {
            self.table
                .lock()
                .expect("correlation table lock poisoned")
                .insert(self.request_id, tx);
        }
        if self.requests.send(raw).is_err() {
            self.table
                .lock()
                .expect("correlation table lock poisoned")
                .remove(&self.request_id);
            return Err(ChannelError::TransportClosed);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ResponseEnvelope, ChannelError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn cancel(&mut self, reason: Value) {
        if self.pending.take().is_some() {
            // The request was never sent; nothing to abort on the wire.
            return;
        }
        let removed = self
            .table
            .lock()
            .expect("correlation table lock poisoned")
            .remove(&self.request_id)
            .is_some();
        if !removed {
            // Already terminal or already cancelled.
            return;
        }
        let envelope = RequestEnvelope::Abort {
            request_id: self.request_id,
            payload: reason,
        };
        if let Ok(raw) = ValueCodec::encode(&envelope) {
            let _ = self.requests.send(raw);
        }
    }
}

impl Drop for BusRequest {
    fn drop(&mut self) {
        if let Ok(mut table) = self.table.lock() {
            table.remove(&self.request_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Serving side
// ---------------------------------------------------------------------------

/// Serving-side listener: yields an exchange per inbound request envelope
/// and routes abort envelopes to the matching exchange's cancel token.
#[derive(Debug)]
pub struct BusListener {
    name: Arc<str>,
    requests: broadcast::Receiver<Value>,
    responses: broadcast::Sender<Value>,
    aborts: Arc<Mutex<HashMap<u32, AbortSlot>>>,
}

#[derive(Debug)]
struct AbortSlot {
    token: CancelToken,
    gone: Arc<AtomicBool>,
}

#[async_trait]
impl Listener for BusListener {
    type Exchange = BusInbound;

    async fn accept(&mut self) -> Option<BusInbound> {
        loop {
            match self.requests.recv().await {
                Ok(raw) => match ValueCodec::decode::<RequestEnvelope>(raw) {
                    Ok(RequestEnvelope::Request {
                        request_id,
                        payload,
                    }) => {
                        let token = CancelToken::new();
                        let gone = Arc::new(AtomicBool::new(false));
                        self.aborts.lock().expect("abort table lock poisoned").insert(
                            request_id,
                            AbortSlot {
                                token: token.clone(),
                                gone: Arc::clone(&gone),
                            },
                        );
                        return Some(BusInbound {
                            request_id,
                            payload: Some(payload),
                            responses: self.responses.clone(),
                            token,
                            gone,
                            aborts: Arc::clone(&self.aborts),
                            done: false,
                        });
                    }
                    Ok(RequestEnvelope::Abort {
                        request_id,
                        payload,
                    }) => {
                        let slot = self
                            .aborts
                            .lock()
                            .expect("abort table lock poisoned")
                            .remove(&request_id);
                        match slot {
                            Some(slot) => {
                                slot.gone.store(true, Ordering::SeqCst);
                                slot.token.cancel(payload);
                            }
                            None => {
                                debug!(
                                    target: "causeway.bus",
                                    bus = %self.name,
                                    request_id,
                                    "dropping abort for unknown request"
                                );
                            }
                        }
                    }
                    Err(error) => {
                        warn!(
                            target: "causeway.bus",
                            bus = %self.name,
                            %error,
                            "dropping undecodable envelope"
                        );
                    }
                },
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(
                        target: "causeway.bus",
                        bus = %self.name,
                        missed,
                        "request subscriber lagging"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Serving side of one bus exchange.
///
/// Sends are suppressed once the remote has aborted the exchange, and at
/// most one terminal envelope is published.
#[derive(Debug)]
pub struct BusInbound {
    request_id: u32,
    payload: Option<Value>,
    responses: broadcast::Sender<Value>,
    token: CancelToken,
    gone: Arc<AtomicBool>,
    aborts: Arc<Mutex<HashMap<u32, AbortSlot>>>,
    done: bool,
}

impl BusInbound {
    fn publish(&self, envelope: &ResponseEnvelope) -> Result<(), ChannelError> {
        let raw = ValueCodec::encode(envelope).map_err(ChannelError::Malformed)?;
        self.responses
            .send(raw)
            .map(|_| ())
            .map_err(|_| ChannelError::TransportClosed)
    }
}

#[async_trait]
impl InboundExchange for BusInbound {
    async fn begin(&mut self) -> Option<(u32, Value)> {
        self.payload
            .take()
            .map(|payload| (self.request_id, payload))
    }

    fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    fn remote_gone(&self) -> bool {
        self.gone.load(Ordering::SeqCst)
    }

    async fn open(&mut self) -> Result<(), ChannelError> {
        // No start envelope on this transport; the stream begins with its
        // first message.
        Ok(())
    }

    async fn send(&mut self, payload: Value) -> Result<(), ChannelError> {
        if self.done || self.remote_gone() {
            return Ok(());
        }
        self.publish(&ResponseEnvelope::StreamMessage {
            request_id: self.request_id,
            payload,
        })
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        if self.remote_gone() {
            return Ok(());
        }
        self.publish(&ResponseEnvelope::Close {
            request_id: self.request_id,
        })
    }

    async fn fail(&mut self, payload: Value) -> Result<(), ChannelError> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        if self.remote_gone() {
            return Ok(());
        }
        self.publish(&ResponseEnvelope::Error {
            request_id: self.request_id,
            payload,
        })
    }
}

impl Drop for BusInbound {
    fn drop(&mut self) {
        if let Ok(mut aborts) = self.aborts.lock() {
            aborts.remove(&self.request_id);
        }
    }
}
