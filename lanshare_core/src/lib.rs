use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

pub mod config;
pub mod discovery;
pub mod identity;
pub mod node;
pub mod transfer;

use config::NodeConfig;
use discovery::Peer;
use identity::NodeIdentity;
use node::Node;
use transfer::{Progress, Role, Transfer};

/// Presence datagram broadcast on the discovery port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryMsg {
    pub name: String,
    pub port: u16,
}

//Command from front end to Core
#[derive(Debug)]
pub enum AppCommand {
    /// Snapshot of the live peers
    ListPeers { reply: oneshot::Sender<Vec<Peer>> },
    /// Send one file to each target, concurrently
    SendFile { path: PathBuf, targets: Vec<IpAddr> },
    /// Stop every outgoing transfer
    CancelOutgoing,
    /// Stop every incoming transfer
    CancelIncoming,
    /// Stop the transfers (both directions) with one peer
    CancelPeer { ip: IpAddr },
    Shutdown,
}

//Report from Core to front end
#[derive(Debug, Clone)]
pub enum AppEvent {
    Status(String),
    Error(String),
    TransferStarted(Transfer),
    TransferProgress(Progress),
    TransferCompleted(Transfer),
    TransferCancelled(Transfer),
    /// `transfer` is `None` when the handshake never completed
    TransferFailed {
        role: Role,
        peer: SocketAddr,
        transfer: Option<Transfer>,
        reason: String,
    },
}

/// Start a node and serve commands until the channel closes or `Shutdown`.
pub async fn run_backend(
    config: NodeConfig,
    identity: NodeIdentity,
    mut cmd_rx: mpsc::Receiver<AppCommand>,
    event_tx: mpsc::Sender<AppEvent>,
) {
    let node = match Node::start(&config, identity, event_tx.clone()).await {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("Failed to start node: {:#}", e);
            let _ = event_tx
                .send(AppEvent::Error(format!("Cannot start: {:#}", e)))
                .await;
            return;
        }
    };

    let _ = event_tx
        .send(AppEvent::Status(format!(
            "Running as {}, receiving on port {} into {}",
            node.name(),
            node.transfer_addr().port(),
            node.receive_dir().display()
        )))
        .await;

    // Main loop: Wait for commands from the front end
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            AppCommand::ListPeers { reply } => {
                let _ = reply.send(node.list_live_peers());
            }
            AppCommand::SendFile { path, targets } => {
                if targets.is_empty() {
                    let _ = event_tx
                        .send(AppEvent::Error("No recipients selected".to_string()))
                        .await;
                    continue;
                }

                tracing::info!(
                    "Sending {} to {} peer(s)",
                    path.display(),
                    targets.len()
                );
                for ip in targets {
                    let target = node.resolve_target(ip);
                    // Outcome arrives as events; the handle is not needed
                    drop(node.send_file(path.clone(), target));
                }
            }
            AppCommand::CancelOutgoing => {
                let count = node.cancel_all(Role::Sender);
                let _ = event_tx
                    .send(AppEvent::Status(format!(
                        "Stopping {} outgoing transfer(s)",
                        count
                    )))
                    .await;
            }
            AppCommand::CancelIncoming => {
                let count = node.cancel_all(Role::Receiver);
                let _ = event_tx
                    .send(AppEvent::Status(format!(
                        "Stopping {} incoming transfer(s)",
                        count
                    )))
                    .await;
            }
            AppCommand::CancelPeer { ip } => {
                let count = node.cancel_peer(Role::Sender, ip) + node.cancel_peer(Role::Receiver, ip);
                let _ = event_tx
                    .send(AppEvent::Status(format!(
                        "Stopping {} transfer(s) with {}",
                        count, ip
                    )))
                    .await;
            }
            AppCommand::Shutdown => break,
        }
    }

    node.shutdown().await;
    let _ = event_tx
        .send(AppEvent::Status("Backend stopped".to_string()))
        .await;
}
