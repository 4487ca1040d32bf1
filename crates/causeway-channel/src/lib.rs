// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod bus;
pub mod error;
pub mod port;

pub use adapter::{InboundExchange, Listener, RequestChannel};
pub use bus::{BusChannel, BusInbound, BusListener, BusRequest, EventBus};
pub use error::ChannelError;
pub use port::{PortChannel, PortConnector, PortEnd, PortInbound, PortListener, port_endpoint};
