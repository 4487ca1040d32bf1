// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod decode;
pub mod stream;

pub use decode::{SseDecoder, SseLine, SseRecord, decode, parse_line};
pub use stream::{byte_record_stream, json_data, record_stream};
