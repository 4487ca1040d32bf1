// SPDX-License-Identifier: MIT OR Apache-2.0
//! Async adapters that lift the push-style decoder onto [`Stream`]s.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::decode::{SseDecoder, SseRecord};

// ---------------------------------------------------------------------------
// Chunk streams to record streams
// ---------------------------------------------------------------------------

/// Decode a stream of text chunks into a stream of records.
///
/// Chunk boundaries are arbitrary; records are yielded exactly when their
/// terminating blank line arrives. A partial trailing record is dropped when
/// the chunk stream ends.
pub fn record_stream<S, T>(chunks: S) -> impl Stream<Item = SseRecord>
where
    S: Stream<Item = T> + Unpin,
    T: AsRef<str>,
{
    stream::unfold(
        (chunks, SseDecoder::new(), VecDeque::new()),
        |(mut chunks, mut decoder, mut ready)| async move {
            loop {
                if let Some(record) = ready.pop_front() {
                    return Some((record, (chunks, decoder, ready)));
                }
                match chunks.next().await {
                    Some(chunk) => ready.extend(decoder.feed(chunk.as_ref())),
                    None => return None,
                }
            }
        },
    )
}

/// Decode a stream of byte chunks, reassembling UTF-8 sequences that were
/// split across chunk boundaries.
pub fn byte_record_stream<S, T>(chunks: S) -> impl Stream<Item = SseRecord>
where
    S: Stream<Item = T> + Unpin,
    T: AsRef<[u8]>,
{
    stream::unfold(
        (chunks, SseDecoder::new(), VecDeque::new()),
        |(mut chunks, mut decoder, mut ready)| async move {
            loop {
                if let Some(record) = ready.pop_front() {
                    return Some((record, (chunks, decoder, ready)));
                }
                match chunks.next().await {
                    Some(chunk) => ready.extend(decoder.feed_bytes(chunk.as_ref())),
                    None => return None,
                }
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Record streams to payload streams
// ---------------------------------------------------------------------------

/// Parse each record's `data` as JSON, skipping records that do not parse.
pub fn json_data<S>(records: S) -> impl Stream<Item = Value>
where
    S: Stream<Item = SseRecord>,
{
    records.filter_map(|record| async move {
        match serde_json::from_str(&record.data) {
            Ok(value) => Some(value),
            Err(error) => {
                debug!(target: "causeway.sse", %error, "skipping record with non-JSON data");
                None
            }
        }
    })
}
