// SPDX-License-Identifier: MIT OR Apache-2.0

#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod handler;
pub mod server;

pub use client::{ResponseStream, request};
pub use error::RpcError;
pub use handler::{HandlerFn, HandlerStream, PortForwarder, RequestHandler, handler_fn};
pub use server::serve;
