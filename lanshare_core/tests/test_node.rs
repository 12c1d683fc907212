use lanshare_core::config::NodeConfig;
use lanshare_core::discovery::Peer;
use lanshare_core::identity::NodeIdentity;
use lanshare_core::node::Node;
use lanshare_core::transfer::{Role, TransferStatus};
use lanshare_core::{AppCommand, AppEvent, run_backend};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A node that announces to itself over loopback, so it shows up as its own peer
fn loopback_config(receive_dir: &Path) -> NodeConfig {
    NodeConfig {
        display_name: Some("Loopback".to_string()),
        transfer_port: 0,
        discovery_port: 0,
        bind_ip: LOOPBACK,
        broadcast_ip: LOOPBACK,
        receive_dir: receive_dir.to_path_buf(),
        ..NodeConfig::default()
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn loopback_identity() -> NodeIdentity {
    NodeIdentity::new("Loopback", HashSet::new())
}

async fn wait_for_received(events: &mut mpsc::Receiver<AppEvent>, file_name: &str) {
    timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if let AppEvent::TransferCompleted(t) = event
                && t.role == Role::Receiver
                && t.file_name == file_name
            {
                return;
            }
        }
        panic!("event channel closed before the file arrived");
    })
    .await
    .expect("file was never received");
}

async fn wait_for_listed_peer(cmd_tx: &mpsc::Sender<AppCommand>) -> Vec<Peer> {
    timeout(Duration::from_secs(3), async {
        loop {
            let (reply, rx) = oneshot::channel();
            cmd_tx.send(AppCommand::ListPeers { reply }).await.unwrap();
            let peers = rx.await.unwrap();
            if !peers.is_empty() {
                return peers;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("backend never listed a peer")
}

async fn wait_for_own_announcement(node: &Node) {
    timeout(Duration::from_secs(3), async {
        while node.list_live_peers().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("node never saw its own announcement");
}

#[tokio::test]
async fn test_node_discovers_itself_and_sends() {
    init_logging();
    // 1. Start
    let src = tempfile::tempdir().unwrap();
    let inbox = tempfile::tempdir().unwrap();
    let config = loopback_config(inbox.path());
    let (tx, mut events) = mpsc::channel(1000);
    let node = Node::start(&config, loopback_identity(), tx)
        .await
        .expect("node failed to start");
    assert_ne!(node.transfer_addr().port(), 0);

    // 2. Its own announcement shows up with the bound transfer port
    wait_for_own_announcement(&node).await;
    let peers = node.list_live_peers();
    assert_eq!(peers[0].name, "Loopback");
    assert_eq!(node.resolve_target(LOOPBACK), node.transfer_addr());

    // 3. Send to itself
    let path = src.path().join("hello.txt");
    std::fs::write(&path, b"hello over loopback").unwrap();
    let sent = node
        .send_file(path, node.resolve_target(LOOPBACK))
        .await
        .unwrap()
        .expect("send failed");
    assert_eq!(sent.status(), TransferStatus::Completed);

    wait_for_received(&mut events, "hello.txt").await;
    assert_eq!(
        std::fs::read(inbox.path().join("hello.txt")).unwrap(),
        b"hello over loopback"
    );

    // 4. Finished transfers leave the table; shutdown returns
    assert_eq!(node.active_transfers().count(Role::Sender), 0);
    timeout(Duration::from_secs(3), node.shutdown())
        .await
        .expect("shutdown hung");
}

#[tokio::test]
async fn test_start_fails_on_taken_port() {
    let inbox = tempfile::tempdir().unwrap();
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

    let config = NodeConfig {
        transfer_port: taken.local_addr().unwrap().port(),
        ..loopback_config(inbox.path())
    };
    let (tx, _events) = mpsc::channel(16);
    assert!(Node::start(&config, loopback_identity(), tx).await.is_err());
}

#[tokio::test]
async fn test_backend_commands() {
    init_logging();
    let src = tempfile::tempdir().unwrap();
    let inbox = tempfile::tempdir().unwrap();
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut events) = mpsc::channel(1000);

    let backend = tokio::spawn(run_backend(
        loopback_config(inbox.path()),
        loopback_identity(),
        cmd_rx,
        event_tx,
    ));

    // 1. Wait until the node lists itself
    let peers = wait_for_listed_peer(&cmd_tx).await;
    assert_eq!(peers[0].address, LOOPBACK);

    // 2. Send through a command
    let path = src.path().join("notes.md");
    std::fs::write(&path, vec![b'x'; 9000]).unwrap();
    cmd_tx
        .send(AppCommand::SendFile {
            path,
            targets: vec![LOOPBACK],
        })
        .await
        .unwrap();
    wait_for_received(&mut events, "notes.md").await;
    assert_eq!(
        std::fs::metadata(inbox.path().join("notes.md")).unwrap().len(),
        9000
    );

    // 3. Nothing running, nothing stopped
    cmd_tx.send(AppCommand::CancelIncoming).await.unwrap();

    // 4. Shutdown ends the loop
    cmd_tx.send(AppCommand::Shutdown).await.unwrap();
    timeout(Duration::from_secs(3), backend)
        .await
        .expect("backend did not stop")
        .unwrap();

    let mut saw_stopped = false;
    while let Ok(event) = events.try_recv() {
        if let AppEvent::Status(msg) = event {
            saw_stopped |= msg == "Backend stopped";
        }
    }
    assert!(saw_stopped);
}

#[tokio::test]
async fn test_stalled_connection_does_not_block_others() {
    init_logging();
    let src = tempfile::tempdir().unwrap();
    let inbox = tempfile::tempdir().unwrap();
    let config = NodeConfig {
        broadcast_interval_secs: 1,
        ..loopback_config(inbox.path())
    };
    let (tx, mut events) = mpsc::channel(1000);
    let node = Node::start(&config, loopback_identity(), tx).await.unwrap();
    wait_for_own_announcement(&node).await;

    // 1. A client that connects and never sends a header
    let stalled = TcpStream::connect(node.transfer_addr()).await.unwrap();

    // 2. Another transfer still goes through while it hangs
    let path = src.path().join("urgent.txt");
    std::fs::write(&path, b"not stuck behind anyone").unwrap();
    let sent = timeout(
        Duration::from_secs(5),
        node.send_file(path, node.resolve_target(LOOPBACK)),
    )
    .await
    .expect("send waited on the stalled connection")
    .unwrap()
    .expect("send failed");
    assert_eq!(sent.status(), TransferStatus::Completed);
    wait_for_received(&mut events, "urgent.txt").await;

    // 3. Discovery keeps refreshing the peer in the meantime
    let seen = node.registry().get(&LOOPBACK).unwrap().last_seen;
    timeout(Duration::from_secs(5), async {
        while node.registry().get(&LOOPBACK).unwrap().last_seen <= seen {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("announcements stopped while a connection was stalled");

    // 4. Shutdown does not wait on the stalled client either
    timeout(Duration::from_secs(3), node.shutdown())
        .await
        .expect("shutdown hung");
    drop(stalled);
}

#[tokio::test]
async fn test_cancel_outgoing_stops_running_send() {
    init_logging();
    let src = tempfile::tempdir().unwrap();
    let inbox = tempfile::tempdir().unwrap();
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    // Small channel: both ends of the transfer wait on this test reading events
    let (event_tx, mut events) = mpsc::channel(4);

    let backend = tokio::spawn(run_backend(
        loopback_config(inbox.path()),
        loopback_identity(),
        cmd_rx,
        event_tx,
    ));
    wait_for_listed_peer(&cmd_tx).await;

    // 1. Start a large send to ourselves
    let path = src.path().join("backup.tar");
    std::fs::write(&path, vec![b'z'; 8_000_000]).unwrap();
    cmd_tx
        .send(AppCommand::SendFile {
            path,
            targets: vec![LOOPBACK],
        })
        .await
        .unwrap();

    // 2. Once the sender reports progress, stop outgoing transfers
    timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if let AppEvent::TransferProgress(p) = event
                && p.role == Role::Sender
            {
                return;
            }
        }
        panic!("event channel closed before the send started");
    })
    .await
    .expect("send never reported progress");
    cmd_tx.send(AppCommand::CancelOutgoing).await.unwrap();

    // 3. The send ends cancelled, part way through; the status and the
    //    cancel event can arrive in either order
    let mut cancelled = None;
    let mut saw_stopping = false;
    timeout(Duration::from_secs(5), async {
        while cancelled.is_none() || !saw_stopping {
            match events.recv().await {
                Some(AppEvent::TransferCancelled(t)) if t.role == Role::Sender => {
                    cancelled = Some(t)
                }
                Some(AppEvent::TransferCompleted(t)) if t.role == Role::Sender => {
                    panic!("send of {} completed despite the cancel", t.file_name)
                }
                Some(AppEvent::Status(msg)) => {
                    saw_stopping |= msg == "Stopping 1 outgoing transfer(s)";
                }
                Some(_) => {}
                None => panic!("event channel closed before the send ended"),
            }
        }
    })
    .await
    .expect("send was never cancelled");
    let cancelled = cancelled.unwrap();
    assert_eq!(cancelled.status(), TransferStatus::Cancelled);
    assert!(cancelled.bytes_moved() < 8_000_000);

    // 4. Keep reading while the backend shuts down
    let drain = tokio::spawn(async move { while events.recv().await.is_some() {} });
    cmd_tx.send(AppCommand::Shutdown).await.unwrap();
    timeout(Duration::from_secs(3), backend)
        .await
        .expect("backend did not stop")
        .unwrap();
    drain.abort();
}
