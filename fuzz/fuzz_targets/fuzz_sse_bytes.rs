// SPDX-License-Identifier: MIT OR Apache-2.0
#![no_main]
use causeway_sse::SseDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = SseDecoder::new();
    for chunk in data.chunks(7) {
        for record in decoder.feed_bytes(chunk) {
            if let Some(retry) = record.retry {
                assert!(!retry.is_empty());
                assert!(retry.bytes().all(|b| b.is_ascii_digit()));
            }
        }
    }
});
