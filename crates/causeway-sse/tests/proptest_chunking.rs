// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property-based tests for the event-stream decoder.

use causeway_sse::{SseDecoder, decode};
use proptest::prelude::*;

// ── Leaf strategies ─────────────────────────────────────────────────────

fn arb_word() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 _.-]{0,12}",
        Just("caf\u{e9}".to_owned()),
        Just("\u{3bb}-calculus".to_owned()),
        Just("\u{1f600}\u{1f680}".to_owned()),
    ]
}

fn arb_terminator() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("\n"), Just("\r"), Just("\r\n")]
}

fn arb_line() -> impl Strategy<Value = String> {
    prop_oneof![
        arb_word().prop_map(|w| format!("data: {w}")),
        arb_word().prop_map(|w| format!("data:{w}")),
        arb_word().prop_map(|w| format!("id: {w}")),
        arb_word().prop_map(|w| format!("event: {w}")),
        "[0-9]{1,5}".prop_map(|d| format!("retry: {d}")),
        arb_word().prop_map(|w| format!("retry: {w}")),
        arb_word().prop_map(|w| format!(": {w}")),
        arb_word(),
        Just(String::new()),
    ]
}

/// A plausible event-stream text: terminated lines plus an optional
/// unterminated tail.
fn arb_text() -> impl Strategy<Value = String> {
    (
        prop::collection::vec((arb_line(), arb_terminator()), 0..12),
        prop::option::of(arb_line()),
    )
        .prop_map(|(lines, tail)| {
            let mut text = String::new();
            for (line, term) in lines {
                text.push_str(&line);
                text.push_str(term);
            }
            if let Some(tail) = tail {
                text.push_str(&tail);
            }
            text
        })
}

// ── Property tests ──────────────────────────────────────────────────────

proptest! {
    /// Splitting the input at arbitrary character boundaries never changes
    /// the decoded records.
    #[test]
    fn chunked_text_matches_single_feed(
        text in arb_text(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let mut positions: Vec<usize> =
            cuts.iter().map(|ix| bounds[ix.index(bounds.len())]).collect();
        positions.sort_unstable();

        let mut decoder = SseDecoder::new();
        let mut records = Vec::new();
        let mut start = 0;
        for pos in positions {
            records.extend(decoder.feed(&text[start..pos]));
            start = pos;
        }
        records.extend(decoder.feed(&text[start..]));

        prop_assert_eq!(records, decode(&text));
    }

    /// Splitting the input at arbitrary byte positions, including inside a
    /// multi-byte sequence, never changes the decoded records.
    #[test]
    fn chunked_bytes_match_single_feed(
        text in arb_text(),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let bytes = text.as_bytes();
        let mut positions: Vec<usize> =
            cuts.iter().map(|ix| ix.index(bytes.len() + 1)).collect();
        positions.sort_unstable();

        let mut decoder = SseDecoder::new();
        let mut records = Vec::new();
        let mut start = 0;
        for pos in positions {
            records.extend(decoder.feed_bytes(&bytes[start..pos]));
            start = pos;
        }
        records.extend(decoder.feed_bytes(&bytes[start..]));

        prop_assert_eq!(records, decode(&text));
    }

    /// Feeding a whole text as one byte chunk matches feeding it as text.
    #[test]
    fn byte_and_text_feeds_agree(text in arb_text()) {
        let mut decoder = SseDecoder::new();
        prop_assert_eq!(decoder.feed_bytes(text.as_bytes()), decode(&text));
    }

    /// Line terminators never leak into decoded fields: only `data` may
    /// contain `\n` (as the join separator) and nothing contains `\r`.
    #[test]
    fn terminators_never_leak_into_fields(text in arb_text()) {
        for record in decode(&text) {
            prop_assert!(!record.data.contains('\r'));
            for field in [&record.id, &record.event, &record.retry] {
                if let Some(value) = field {
                    prop_assert!(!value.contains('\r'));
                    prop_assert!(!value.contains('\n'));
                }
            }
        }
    }

    /// A decoded `retry` is always a non-empty run of ASCII digits.
    #[test]
    fn retry_is_always_digits(text in arb_text()) {
        for record in decode(&text) {
            if let Some(retry) = record.retry {
                prop_assert!(!retry.is_empty());
                prop_assert!(retry.bytes().all(|b| b.is_ascii_digit()));
            }
        }
    }

    /// Decoding is total: arbitrary text never panics.
    #[test]
    fn decode_never_panics(text in ".*") {
        let _ = decode(&text);
    }

    /// Byte decoding is total: arbitrary bytes, valid UTF-8 or not, never
    /// panic.
    #[test]
    fn feed_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut decoder = SseDecoder::new();
        let _ = decoder.feed_bytes(&bytes);
    }
}
