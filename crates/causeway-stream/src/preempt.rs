// SPDX-License-Identifier: MIT OR Apache-2.0

//! The switch-to-latest combinator.

use std::future::{Future, pending};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use causeway_protocol::CancelToken;

/// Outputs buffered between the driver task and a slow consumer.
const OUTPUT_BUFFER: usize = 256;

/// The in-flight invocation: its token, and its output flattened behind the
/// handler future so starting and streaming are one state.
type Generation<Fut> = (CancelToken, Pin<Box<stream::Flatten<stream::Once<Fut>>>>);

/// Run `handler` once per `source` value, always switching to the latest.
///
/// Each invocation gets a fresh [`CancelToken`]; a newer trigger cancels the
/// previous invocation's token with reason `"superseded"` before the new
/// handler is invoked, and drops its output stream, so nothing a superseded
/// invocation produces afterwards reaches the consumer.
///
/// Closing the source is not a cancellation: the last invocation runs to
/// its own end, then the output stream ends. Dropping the output stream
/// cancels whatever is in flight with reason `"output dropped"`.
pub fn preempt<S, H, Fut, B>(source: S, handler: H) -> PreemptStream<B::Item>
where
    S: Stream + Unpin + Send + 'static,
    S::Item: Send,
    H: FnMut(S::Item, CancelToken) -> Fut + Send + 'static,
    Fut: Future<Output = B> + Send + 'static,
    B: Stream + Send + 'static,
    B::Item: Send,
{
    let (tx, rx) = mpsc::channel(OUTPUT_BUFFER);
    tokio::spawn(drive(source, handler, tx));
    PreemptStream { rx }
}

async fn drive<S, H, Fut, B>(mut source: S, mut handler: H, tx: mpsc::Sender<B::Item>)
where
    S: Stream + Unpin,
    H: FnMut(S::Item, CancelToken) -> Fut,
    Fut: Future<Output = B>,
    B: Stream,
{
    let mut source_open = true;
    let mut current: Option<Generation<Fut>> = None;

    loop {
        if !source_open && current.is_none() {
            return;
        }
        tokio::select! {
            biased;
            () = tx.closed() => {
                if let Some((token, _)) = &current {
                    token.cancel(Value::from("output dropped"));
                }
                return;
            }
            trigger = source.next(), if source_open => match trigger {
                Some(trigger) => {
                    if let Some((token, _body)) = current.take() {
                        debug!(target: "causeway.preempt", "cancelling superseded invocation");
                        token.cancel(Value::from("superseded"));
                    }
                    let token = CancelToken::new();
                    let body = stream::once(handler(trigger, token.clone())).flatten();
                    current = Some((token, Box::pin(body)));
                }
                None => source_open = false,
            },
            item = next_item(&mut current), if current.is_some() => match item {
                Some(value) => {
                    if tx.send(value).await.is_err() {
                        if let Some((token, _)) = &current {
                            token.cancel(Value::from("output dropped"));
                        }
                        return;
                    }
                }
                None => current = None,
            },
        }
    }
}

async fn next_item<Fut, B>(current: &mut Option<Generation<Fut>>) -> Option<B::Item>
where
    Fut: Future<Output = B>,
    B: Stream,
{
    match current {
        Some((_, body)) => body.next().await,
        // Disabled by the select guard whenever nothing is in flight.
        None => pending().await,
    }
}

/// Output stream of [`preempt`]: the forwarded items of whichever handler
/// invocation is (or was last) current.
#[derive(Debug)]
pub struct PreemptStream<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> PreemptStream<T> {
    /// Receive the next output value, or `None` once the source has closed
    /// and the last invocation has finished.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for PreemptStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
