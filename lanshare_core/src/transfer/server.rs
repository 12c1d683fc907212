use crate::AppEvent;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::active::ActiveTransfers;
use super::receiver::receive_file;
use super::state::Role;
use super::utils::TransferOptions;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accept incoming transfers until `shutdown` fires.
///
/// Every connection gets its own task and its own cancellation token, so a
/// stalled or failing transfer never holds up the loop.
pub async fn run_server(
    listener: TcpListener,
    receive_dir: PathBuf,
    options: TransferOptions,
    event_tx: mpsc::Sender<AppEvent>,
    active: Arc<ActiveTransfers>,
    shutdown: CancellationToken,
) {
    match listener.local_addr() {
        Ok(addr) => tracing::info!("Waiting for files on {}", addr),
        Err(e) => tracing::warn!("Transfer listener has no local address: {}", e),
    }

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (mut stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        tracing::info!("Incoming connection from {}", peer);
        let guard = active.register(Role::Receiver, peer.ip());
        let receive_dir = receive_dir.clone();
        let options = options.clone();
        let event_tx = event_tx.clone();

        tokio::spawn(async move {
            // Errors were already logged and emitted by receive_file
            let _ = receive_file(
                &mut stream,
                peer,
                &receive_dir,
                &options,
                Some(&event_tx),
                guard.token(),
            )
            .await;
        });
    }

    tracing::info!("Transfer listener stopped");
}
