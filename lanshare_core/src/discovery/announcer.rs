use crate::DiscoveryMsg;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::encode_msg;

/// Periodically broadcasts this node's name and transfer port.
pub struct Announcer {
    socket: UdpSocket,
    target: SocketAddr,
    packet: Vec<u8>,
    interval: Duration,
}

impl Announcer {
    /// Bind an ephemeral broadcast-enabled socket aimed at `target`
    pub async fn bind(
        name: String,
        transfer_port: u16,
        target: SocketAddr,
        interval: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0)))
            .await
            .context("Failed to bind announce socket")?;
        socket
            .set_broadcast(true)
            .context("Failed to enable broadcast")?;

        let packet = encode_msg(&DiscoveryMsg {
            name,
            port: transfer_port,
        })?;

        Ok(Self {
            socket,
            target,
            packet,
            interval,
        })
    }

    /// Send one presence datagram
    pub async fn announce(&self) -> std::io::Result<()> {
        self.socket.send_to(&self.packet, self.target).await?;
        Ok(())
    }

    /// Broadcast immediately, then every interval until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.announce().await {
                        tracing::warn!("Presence broadcast to {} failed: {}", self.target, e);
                    }
                }
            }
        }

        tracing::debug!("Announcer stopped");
    }
}
