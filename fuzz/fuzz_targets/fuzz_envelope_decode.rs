// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz envelope decoding with arbitrary JSON-shaped input.
//!
//! Malformed values must surface as decode errors, never panics, and any
//! value that does decode must survive an encode/decode round trip.
#![no_main]
use causeway_protocol::{RequestEnvelope, ResponseEnvelope, ValueCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };

    if let Ok(envelope) = ValueCodec::decode::<RequestEnvelope>(value.clone()) {
        let wire = ValueCodec::encode(&envelope).unwrap();
        let again: RequestEnvelope = ValueCodec::decode(wire).unwrap();
        assert_eq!(envelope, again);
    }

    if let Ok(envelope) = ValueCodec::decode::<ResponseEnvelope>(value) {
        let wire = ValueCodec::encode(&envelope).unwrap();
        let again: ResponseEnvelope = ValueCodec::decode(wire).unwrap();
        assert_eq!(envelope, again);
    }
});
