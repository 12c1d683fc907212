use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

/// A remote node known through its presence broadcasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub address: IpAddr,
    pub name: String,
    /// Transfer port the peer announced
    pub port: u16,
    pub last_seen: Instant,
}

impl Peer {
    /// Address a sender should connect to
    pub fn transfer_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > threshold
    }
}

/// Live peer table keyed by IP address.
///
/// Every operation takes `now` explicitly so expiry can be driven by the
/// reaper task in production and by fixed instants in tests.
pub struct PeerRegistry {
    peers: RwLock<HashMap<IpAddr, Peer>>,
    stale_threshold: Duration,
}

impl PeerRegistry {
    pub fn new(stale_threshold: Duration) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            stale_threshold,
        }
    }

    /// Insert a peer or refresh its name, port and `last_seen`
    pub fn upsert(&self, address: IpAddr, name: String, port: u16, now: Instant) {
        let mut peers = self.peers.write();
        match peers.get_mut(&address) {
            Some(peer) => {
                peer.name = name;
                peer.port = port;
                peer.last_seen = now;
            }
            None => {
                tracing::info!("Peer found: {} ({}:{})", name, address, port);
                peers.insert(
                    address,
                    Peer {
                        address,
                        name,
                        port,
                        last_seen: now,
                    },
                );
            }
        }
    }

    /// Snapshot of peers heard from within the stale threshold, sorted by address
    pub fn list_live(&self, now: Instant) -> Vec<Peer> {
        let peers = self.peers.read();
        let mut live: Vec<Peer> = peers
            .values()
            .filter(|peer| !peer.is_stale(now, self.stale_threshold))
            .cloned()
            .collect();
        live.sort_by_key(|peer| peer.address);
        live
    }

    /// Drop every peer whose last broadcast is older than the threshold
    pub fn evict_stale(&self, now: Instant) {
        let threshold = self.stale_threshold;
        self.peers.write().retain(|_, peer| {
            let keep = !peer.is_stale(now, threshold);
            if !keep {
                tracing::info!("Peer expired: {} ({})", peer.name, peer.address);
            }
            keep
        });
    }

    pub fn get(&self, address: &IpAddr) -> Option<Peer> {
        self.peers.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
