use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::AppEvent;
use crate::config::NodeConfig;
use crate::discovery::{Announcer, DiscoveryListener, Peer, PeerRegistry, run_reaper};
use crate::identity::NodeIdentity;
use crate::transfer::{
    ActiveTransfers, Role, Transfer, TransferError, TransferOptions, run_server, send_file,
};

/// A running LAN share node: discovery, the accept loop, and outgoing sends.
pub struct Node {
    name: String,
    registry: Arc<PeerRegistry>,
    active: Arc<ActiveTransfers>,
    options: TransferOptions,
    receive_dir: PathBuf,
    default_transfer_port: u16,
    transfer_addr: SocketAddr,
    discovery_addr: SocketAddr,
    event_tx: mpsc::Sender<AppEvent>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bind every socket, then spawn the background tasks.
    /// Nothing is spawned if any bind fails.
    pub async fn start(
        config: &NodeConfig,
        identity: NodeIdentity,
        event_tx: mpsc::Sender<AppEvent>,
    ) -> Result<Self> {
        let registry = Arc::new(PeerRegistry::new(config.stale_threshold()));

        let discovery_bind = SocketAddr::new(config.bind_ip, config.discovery_port);
        let listener = DiscoveryListener::bind(
            discovery_bind,
            registry.clone(),
            Arc::new(identity.local_ips.clone()),
        )
        .await
        .with_context(|| format!("Failed to bind discovery port {}", discovery_bind))?;
        let discovery_addr = listener.local_addr()?;

        let transfer_bind = SocketAddr::new(config.bind_ip, config.transfer_port);
        let tcp = TcpListener::bind(transfer_bind)
            .await
            .with_context(|| format!("Failed to bind transfer port {}", transfer_bind))?;
        let transfer_addr = tcp.local_addr()?;

        // Announce the port actually bound, which differs when configured as 0
        let announcer = Announcer::bind(
            identity.name.clone(),
            transfer_addr.port(),
            SocketAddr::new(config.broadcast_ip, discovery_addr.port()),
            config.broadcast_interval(),
        )
        .await?;

        let active = Arc::new(ActiveTransfers::new());
        let shutdown = CancellationToken::new();
        let options = config.transfer_options();

        let tasks = vec![
            tokio::spawn(announcer.run(shutdown.clone())),
            tokio::spawn(listener.run(shutdown.clone())),
            tokio::spawn(run_reaper(
                registry.clone(),
                config.reap_interval(),
                shutdown.clone(),
            )),
            tokio::spawn(run_server(
                tcp,
                config.receive_dir.clone(),
                options.clone(),
                event_tx.clone(),
                active.clone(),
                shutdown.clone(),
            )),
        ];

        tracing::info!(
            "Node {} up: transfers on {}, discovery on {}",
            identity.name,
            transfer_addr,
            discovery_addr
        );

        Ok(Self {
            name: identity.name,
            registry,
            active,
            options,
            receive_dir: config.receive_dir.clone(),
            default_transfer_port: config.transfer_port,
            transfer_addr,
            discovery_addr,
            event_tx,
            shutdown,
            tasks,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn list_live_peers(&self) -> Vec<Peer> {
        self.registry.list_live(Instant::now())
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn active_transfers(&self) -> &Arc<ActiveTransfers> {
        &self.active
    }

    pub fn transfer_addr(&self) -> SocketAddr {
        self.transfer_addr
    }

    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery_addr
    }

    pub fn receive_dir(&self) -> &Path {
        &self.receive_dir
    }

    /// Where to send files for `ip`: the port it announced, else ours
    pub fn resolve_target(&self, ip: IpAddr) -> SocketAddr {
        match self.registry.get(&ip) {
            Some(peer) => peer.transfer_addr(),
            None => SocketAddr::new(ip, self.default_transfer_port),
        }
    }

    /// Start sending `path` to `target` in its own task
    pub fn send_file(
        &self,
        path: PathBuf,
        target: SocketAddr,
    ) -> JoinHandle<Result<Transfer, TransferError>> {
        let guard = self.active.register(Role::Sender, target.ip());
        let options = self.options.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            send_file(&path, target, &options, Some(&event_tx), guard.token()).await
        })
    }

    pub fn cancel_all(&self, role: Role) -> usize {
        let count = self.active.cancel_all(role);
        tracing::info!("Stopping {} {} transfer(s)", count, role);
        count
    }

    pub fn cancel_peer(&self, role: Role, ip: IpAddr) -> usize {
        let count = self.active.cancel_peer(role, ip);
        tracing::info!("Stopping {} {} transfer(s) with {}", count, role, ip);
        count
    }

    /// Stop the background tasks and signal every transfer still running
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.active.cancel_everything();

        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
        tracing::info!("Node {} stopped", self.name);
    }
}
