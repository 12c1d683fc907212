use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::registry::PeerRegistry;
use super::{MAX_DATAGRAM_SIZE, decode_msg};

/// Receives presence datagrams and records their senders in the registry.
pub struct DiscoveryListener {
    socket: UdpSocket,
    registry: Arc<PeerRegistry>,
    local_ips: Arc<HashSet<IpAddr>>,
}

impl DiscoveryListener {
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<PeerRegistry>,
        local_ips: Arc<HashSet<IpAddr>>,
    ) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(addr).await?;

        Ok(Self {
            socket,
            registry,
            local_ips,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Apply one datagram to the registry. Returns whether a peer was upserted.
    pub fn handle_datagram(&self, data: &[u8], from: SocketAddr, now: Instant) -> bool {
        if self.local_ips.contains(&from.ip()) {
            return false;
        }

        match decode_msg(data) {
            Some(msg) => {
                self.registry.upsert(from.ip(), msg.name, msg.port, now);
                true
            }
            None => {
                tracing::debug!("Dropped malformed discovery packet from {}", from);
                false
            }
        }
    }

    /// Receive loop; only `shutdown` ends it
    pub async fn run(self, shutdown: CancellationToken) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        self.handle_datagram(&buf[..len], from, Instant::now());
                    }
                    Err(e) => {
                        // e.g. ICMP port unreachable surfacing on Windows
                        tracing::warn!("Discovery socket error: {}", e);
                    }
                }
            }
        }

        tracing::debug!("Discovery listener stopped");
    }
}
