//! LAN presence protocol.
//!
//! Every node broadcasts a small JSON datagram (`{"name": .., "port": ..}`)
//! on the discovery port. Listeners turn those datagrams into entries of a
//! shared [`PeerRegistry`], and a reaper drops peers that went quiet.

pub mod announcer;
pub mod listener;
pub mod reaper;
pub mod registry;

use crate::DiscoveryMsg;

pub use announcer::Announcer;
pub use listener::DiscoveryListener;
pub use reaper::run_reaper;
pub use registry::{Peer, PeerRegistry};

/// Default UDP port for presence broadcasts
pub const DISCOVERY_PORT: u16 = 54545;

/// Seconds between two presence broadcasts
pub const BROADCAST_INTERVAL_SECS: u64 = 5;

/// A peer not heard from for longer than this is stale
pub const STALE_THRESHOLD_SECS: u64 = 10;

/// Seconds between two registry sweeps
pub const REAP_INTERVAL_SECS: u64 = 2;

/// Largest datagram the listener accepts
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Serialize a presence message into its wire form
pub fn encode_msg(msg: &DiscoveryMsg) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(msg)
}

/// Parse a received datagram, `None` if it is not a presence message
pub fn decode_msg(data: &[u8]) -> Option<DiscoveryMsg> {
    serde_json::from_slice(data).ok()
}
