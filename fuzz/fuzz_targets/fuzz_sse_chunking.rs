// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz chunk-boundary independence of the event stream decoder.
//!
//! Splitting the input text at arbitrary char boundaries and feeding the
//! pieces one by one must produce the same records as decoding it whole.
#![no_main]
use arbitrary::Arbitrary;
use causeway_sse::{SseDecoder, decode};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    text: String,
    cuts: Vec<usize>,
}

fuzz_target!(|input: Input| {
    let whole = decode(&input.text);

    let mut decoder = SseDecoder::new();
    let mut chunked = Vec::new();
    let mut rest = input.text.as_str();
    for cut in input.cuts {
        if rest.is_empty() {
            break;
        }
        let at = cut % (rest.len() + 1);
        if !rest.is_char_boundary(at) {
            continue;
        }
        let (head, tail) = rest.split_at(at);
        chunked.extend(decoder.feed(head));
        rest = tail;
    }
    chunked.extend(decoder.feed(rest));

    assert_eq!(chunked, whole);
});
