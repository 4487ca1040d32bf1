// SPDX-License-Identifier: MIT OR Apache-2.0

//! Requesting side: send one payload, consume an ordered response stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use causeway_channel::RequestChannel;
use causeway_protocol::{CancelToken, ResponseEnvelope};

use crate::error::RpcError;

/// Response values buffered between the pump task and a slow consumer.
const STREAM_BUFFER: usize = 256;

/// What the opening envelope of an exchange turned out to be.
enum First {
    Started,
    Message(Value),
    Closed,
}

/// Send `payload` over `channel` and return the response stream.
///
/// Resolves once the exchange's opening envelope arrives. Transports with a
/// start handshake send `stream-start` first; others begin directly with a
/// message or a terminal, and both conventions are accepted. An opening
/// `error` fails the call with [`RpcError::Upstream`], an opening `close`
/// yields an already-finished stream.
///
/// Cancelling `token` aborts the exchange with the token's reason, before
/// or after the opening envelope.
pub async fn request<C>(
    mut channel: C,
    payload: Value,
    token: CancelToken,
) -> Result<ResponseStream, RpcError>
where
    C: RequestChannel + 'static,
{
    if token.is_cancelled() {
        return Err(RpcError::Cancelled {
            reason: token.reason().unwrap_or(Value::Null),
        });
    }
    channel.send_request(payload).await?;

    let first = tokio::select! {
        biased;
        () = token.cancelled() => {
            let reason = token.reason().unwrap_or(Value::Null);
            channel.cancel(reason.clone()).await;
            return Err(RpcError::Cancelled { reason });
        }
        envelope = channel.recv() => match envelope {
            None => return Err(RpcError::TransportGone),
            Some(Err(error)) => {
                warn!(target: "causeway.rpc", %error, "opening envelope failed to decode");
                channel.cancel(Value::from("malformed response")).await;
                return Err(error.into());
            }
            Some(Ok(ResponseEnvelope::StreamStart { .. })) => First::Started,
            Some(Ok(ResponseEnvelope::StreamMessage { payload, .. })) => First::Message(payload),
            Some(Ok(ResponseEnvelope::Close { .. })) => First::Closed,
            Some(Ok(ResponseEnvelope::Error { payload, .. })) => {
                return Err(RpcError::Upstream(payload));
            }
        },
    };

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    match first {
        First::Closed => {
            // Terminal before any message: hand back an already-finished
            // stream and never spawn a pump.
        }
        First::Message(value) => {
            let _ = tx.try_send(Ok(value));
            tokio::spawn(pump(channel, token, tx));
        }
        First::Started => {
            tokio::spawn(pump(channel, token, tx));
        }
    }
    Ok(ResponseStream { rx })
}

/// Forward envelopes into the consumer's stream until a terminal state.
async fn pump<C>(mut channel: C, token: CancelToken, tx: mpsc::Sender<Result<Value, RpcError>>)
where
    C: RequestChannel,
{
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                let reason = token.reason().unwrap_or(Value::Null);
                channel.cancel(reason.clone()).await;
                let _ = tx.send(Err(RpcError::Cancelled { reason })).await;
                return;
            }
            () = tx.closed() => {
                // The consumer dropped the stream; abort so the server can
                // stop producing.
                channel.cancel(Value::from("response stream dropped")).await;
                return;
            }
            envelope = channel.recv() => match envelope {
                None => {
                    let _ = tx.send(Err(RpcError::TransportGone)).await;
                    return;
                }
                Some(Err(error)) => {
                    warn!(target: "causeway.rpc", %error, "response envelope failed to decode");
                    channel.cancel(Value::from("malformed response")).await;
                    let _ = tx.send(Err(error.into())).await;
                    return;
                }
                Some(Ok(ResponseEnvelope::StreamMessage { payload, .. })) => {
                    if tx.send(Ok(payload)).await.is_err() {
                        channel.cancel(Value::from("response stream dropped")).await;
                        return;
                    }
                }
                Some(Ok(ResponseEnvelope::Close { .. })) => return,
                Some(Ok(ResponseEnvelope::Error { payload, .. })) => {
                    let _ = tx.send(Err(RpcError::Upstream(payload))).await;
                    return;
                }
                Some(Ok(ResponseEnvelope::StreamStart { .. })) => {
                    warn!(target: "causeway.rpc", "stream-start arrived after the stream began");
                    channel.cancel(Value::from("unexpected stream-start")).await;
                    let _ = tx
                        .send(Err(RpcError::Protocol(
                            "stream-start after the stream began".into(),
                        )))
                        .await;
                    return;
                }
            },
        }
    }
}

/// Ordered stream of response values for one exchange.
///
/// Yields each `stream-message` payload in production order. A clean close
/// simply ends the stream; any failure arrives as one final `Err` item.
#[derive(Debug)]
pub struct ResponseStream {
    rx: mpsc::Receiver<Result<Value, RpcError>>,
}

impl ResponseStream {
    /// Receive the next response value, or `None` once the stream is over.
    pub async fn recv(&mut self) -> Option<Result<Value, RpcError>> {
        self.rx.recv().await
    }
}

impl Stream for ResponseStream {
    type Item = Result<Value, RpcError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
