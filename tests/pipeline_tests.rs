// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-system tests: trigger streams driving exchanges across bridged
//! transports, with an event-stream decoder on the far end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use causeway_channel::{EventBus, port_endpoint};
use causeway_protocol::CancelToken;
use causeway_rpc::{HandlerStream, PortForwarder, handler_fn, request, serve};
use causeway_sse::{json_data, record_stream};
use causeway_stream::preempt;
use futures::{StreamExt, stream};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

const TICK: Duration = Duration::from_millis(200);

type Exchanges = Arc<Mutex<Vec<(CancelToken, mpsc::Sender<Result<Value, Value>>)>>>;

async fn nth_exchange(
    exchanges: &Exchanges,
    n: usize,
) -> (CancelToken, mpsc::Sender<Result<Value, Value>>) {
    timeout(TICK, async {
        loop {
            {
                let mut seen = exchanges.lock().unwrap();
                if seen.len() >= n {
                    let (token, producer) = &mut seen[n - 1];
                    // Hand the test the only live sender: a clone left in the
                    // stash would keep the exchange's stream open after the
                    // test drops its producer.
                    let (closed, _) = mpsc::channel(1);
                    return (token.clone(), std::mem::replace(producer, closed));
                }
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("exchange never started")
}

#[tokio::test]
async fn completion_pipeline_streams_decoded_events() {
    // Far side: a port server whose handler decodes a chunked event stream
    // and relays each JSON data payload, dropping the one that is not JSON.
    let (connector, port_listener) = port_endpoint();
    tokio::spawn(serve(
        port_listener,
        handler_fn(|payload, _token| async move {
            let prompt = payload["prompt"].as_str().unwrap_or("?").to_owned();
            let chunks = vec![
                format!("data: {{\"delta\": \"{prompt}-1\"}}\n\n"),
                "data: not json\n\n".to_owned(),
                format!("data: {{\"delta\": \"{prompt}-2\"}}\n\n"),
            ];
            let records = record_stream(stream::iter(chunks));
            Ok(Box::pin(json_data(records).map(Ok)) as HandlerStream)
        }),
    ));

    // Near side: a bus whose server relays every request over the port.
    let bus = EventBus::new("pipeline");
    tokio::spawn(serve(bus.listener(), PortForwarder::new(connector)));

    let client = bus.client();
    let (prompt_tx, prompt_rx) = mpsc::channel(8);
    let mut out = preempt(
        ReceiverStream::new(prompt_rx),
        move |prompt: Value, token| {
            let channel = client.open_request();
            async move {
                request(channel, prompt, token)
                    .await
                    .expect("request accepted")
            }
        },
    );

    prompt_tx.send(json!({"prompt": "alpha"})).await.unwrap();
    assert_eq!(
        timeout(TICK, out.recv()).await.unwrap(),
        Some(Ok(json!({"delta": "alpha-1"})))
    );
    assert_eq!(
        timeout(TICK, out.recv()).await.unwrap(),
        Some(Ok(json!({"delta": "alpha-2"})))
    );

    drop(prompt_tx);
    assert_eq!(timeout(TICK, out.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn preempting_a_prompt_aborts_the_bridged_exchange() {
    // Far side: a port server that stalls after one echo, capturing its
    // token and producer so the test can watch the abort arrive.
    let (connector, port_listener) = port_endpoint();
    let exchanges: Exchanges = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(serve(port_listener, {
        let exchanges = Arc::clone(&exchanges);
        handler_fn(move |payload, token| {
            let exchanges = Arc::clone(&exchanges);
            async move {
                let (tx, rx) = mpsc::channel(8);
                tx.send(Ok(json!({"echo": payload})))
                    .await
                    .map_err(|_| json!("probe wiring broke"))?;
                exchanges.lock().unwrap().push((token, tx));
                Ok(Box::pin(ReceiverStream::new(rx)) as HandlerStream)
            }
        })
    }));

    let bus = EventBus::new("pipeline");
    tokio::spawn(serve(bus.listener(), PortForwarder::new(connector)));

    let client = bus.client();
    let (prompt_tx, prompt_rx) = mpsc::channel(8);
    let mut out = preempt(
        ReceiverStream::new(prompt_rx),
        move |prompt: Value, token| {
            let channel = client.open_request();
            async move {
                request(channel, prompt, token)
                    .await
                    .expect("request accepted")
            }
        },
    );

    prompt_tx.send(json!("a")).await.unwrap();
    assert_eq!(
        timeout(TICK, out.recv()).await.unwrap(),
        Some(Ok(json!({"echo": "a"})))
    );
    let (first_token, _first_producer) = nth_exchange(&exchanges, 1).await;

    prompt_tx.send(json!("b")).await.unwrap();
    assert_eq!(
        timeout(TICK, out.recv()).await.unwrap(),
        Some(Ok(json!({"echo": "b"})))
    );

    // The supersede crossed the bus as an abort, and the forwarder tore its
    // port down; that transport carries no reason of its own.
    timeout(TICK, first_token.cancelled())
        .await
        .expect("bridged exchange token never fired");
    assert_eq!(first_token.reason(), Some(json!("port disconnected")));

    let (_, second_producer) = nth_exchange(&exchanges, 2).await;
    drop(prompt_tx);
    second_producer.send(Ok(json!("tail"))).await.unwrap();
    assert_eq!(
        timeout(TICK, out.recv()).await.unwrap(),
        Some(Ok(json!("tail")))
    );
    drop(second_producer);
    assert_eq!(timeout(TICK, out.recv()).await.unwrap(), None);
}
