//! Domain-fronted HTTP polling transport: emulates a bidirectional byte stream over a sequence
//! of HTTP POSTs to a fronting host, so that a stream multiplexer can be built on top without
//! knowing HTTP is underneath at all.

#[macro_use]
extern crate tracing;

mod client;
mod queue;
mod server;

pub use client::{probe, PollingClientConfig, PollingConduit};
pub use server::{PollingServer, PollingServerConduit};
