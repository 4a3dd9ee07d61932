//! Peer descriptors, their persisted health scores, and the pure ranking function that turns
//! a peer list plus a health snapshot into the attempt order consumed by the racing dialer.

#[macro_use]
extern crate tracing;

mod health;
mod peer;
mod ranking;

pub use health::{PeerHealth, PeerStateStore, STORE_KEY};
pub use peer::{parse_peer_list, Peer};
pub use ranking::rank_peers;
