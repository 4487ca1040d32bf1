// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serving side: accept inbound exchanges and drive a handler for each.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use causeway_channel::{InboundExchange, Listener};

use crate::handler::RequestHandler;

/// Accept exchanges from `listener` until its transport closes, driving
/// `handler` for each request on its own task.
///
/// Exchanges already in flight when the listener closes keep running to
/// their own termination.
pub async fn serve<L, H>(mut listener: L, handler: H)
where
    L: Listener,
    H: RequestHandler + 'static,
{
    let handler = Arc::new(handler);
    while let Some(exchange) = listener.accept().await {
        tokio::spawn(drive(exchange, Arc::clone(&handler)));
    }
    debug!(target: "causeway.rpc", "listener closed, server loop ending");
}

/// Run one exchange: obtain the handler's stream and relay it envelope by
/// envelope, in production order, until a terminal state.
async fn drive<E, H>(mut exchange: E, handler: Arc<H>)
where
    E: InboundExchange,
    H: RequestHandler,
{
    let Some((request_id, payload)) = exchange.begin().await else {
        debug!(target: "causeway.rpc", "requester gone before the exchange began");
        return;
    };
    let token = exchange.cancel_token();

    let mut body = match handler.handle(payload, token.clone()).await {
        Ok(body) => body,
        Err(error) => {
            if !token.is_cancelled() {
                token.cancel(error.clone());
            }
            if !exchange.remote_gone() {
                if let Err(send_error) = exchange.fail(error).await {
                    warn!(
                        target: "causeway.rpc",
                        request_id,
                        error = %send_error,
                        "handler failure could not be reported"
                    );
                }
            }
            return;
        }
    };

    if let Err(error) = exchange.open().await {
        warn!(target: "causeway.rpc", request_id, %error, "response stream failed to start");
        return;
    }

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                // The requester aborted or its transport went away. Output
                // the handler produces from here on is discarded, whether
                // or not it honours the token.
                if !exchange.remote_gone() {
                    let reason = token.reason().unwrap_or(Value::Null);
                    let _ = exchange.fail(reason).await;
                }
                break;
            }
            item = body.next() => match item {
                Some(Ok(value)) => {
                    if let Err(error) = exchange.send(value).await {
                        debug!(target: "causeway.rpc", request_id, %error, "response send failed");
                        break;
                    }
                }
                Some(Err(error)) => {
                    if !token.is_cancelled() {
                        token.cancel(error.clone());
                    }
                    if !exchange.remote_gone() {
                        let _ = exchange.fail(error).await;
                    }
                    break;
                }
                None => {
                    if let Err(error) = exchange.close().await {
                        debug!(target: "causeway.rpc", request_id, %error, "close went undelivered");
                    }
                    break;
                }
            },
        }
    }
}
