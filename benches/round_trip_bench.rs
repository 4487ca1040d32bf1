// SPDX-License-Identifier: MIT OR Apache-2.0
//! Round-trip latency of a small exchange over each transport.

use causeway_channel::{EventBus, port_endpoint};
use causeway_protocol::CancelToken;
use causeway_rpc::{HandlerStream, handler_fn, request, serve};
use criterion::{Criterion, criterion_group, criterion_main};
use futures::stream;
use serde_json::{Value, json};

fn three_values(payload: Value) -> HandlerStream {
    Box::pin(stream::iter(vec![
        Ok(payload),
        Ok(json!({"n": 2})),
        Ok(json!({"n": 3})),
    ]))
}

fn bench_port_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (connector, listener) = port_endpoint();
    rt.spawn(serve(
        listener,
        handler_fn(|payload, _token| async move { Ok(three_values(payload)) }),
    ));

    c.bench_function("port_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                let channel = connector.connect().unwrap();
                let mut responses = request(channel, json!({"n": 1}), CancelToken::new())
                    .await
                    .unwrap();
                while let Some(item) = responses.recv().await {
                    item.unwrap();
                }
            })
        })
    });
}

fn bench_bus_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = EventBus::new("bench");
    rt.spawn(serve(
        bus.listener(),
        handler_fn(|payload, _token| async move { Ok(three_values(payload)) }),
    ));
    let client = rt.block_on(async { bus.client() });

    c.bench_function("bus_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                let channel = client.open_request();
                let mut responses = request(channel, json!({"n": 1}), CancelToken::new())
                    .await
                    .unwrap();
                while let Some(item) = responses.recv().await {
                    item.unwrap();
                }
            })
        })
    });
}

criterion_group!(benches, bench_port_round_trip, bench_bus_round_trip);
criterion_main!(benches);
