// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod codec;
pub mod envelope;
pub mod error;

pub use cancel::CancelToken;
pub use codec::ValueCodec;
pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use error::ProtocolError;
