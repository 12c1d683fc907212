use anyhow::Result;
use lanshare_core::AppCommand;
use lanshare_core::discovery::Peer;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, oneshot};

const MENU: &str = "\n1. List peers\n2. Send file\n3. Stop outgoing transfers\n4. Stop incoming transfers\n5. Exit";

type Input = Lines<BufReader<Stdin>>;

/// Interactive loop. Returns when the user exits, stdin closes, or the
/// backend stops taking commands.
pub async fn run(cmd_tx: mpsc::Sender<AppCommand>) -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("{}", MENU);
        let Some(choice) = prompt(&mut input, &cmd_tx, "> ").await? else {
            return Ok(());
        };

        let cmd = match choice.trim() {
            "1" => {
                let peers = fetch_peers(&cmd_tx).await;
                print_peers(&peers);
                continue;
            }
            "2" => match ask_send(&mut input, &cmd_tx).await? {
                Some(cmd) => cmd,
                None => continue,
            },
            "3" => AppCommand::CancelOutgoing,
            "4" => AppCommand::CancelIncoming,
            "5" => return Ok(()),
            other => {
                println!("Unknown choice {:?}", other);
                continue;
            }
        };

        if cmd_tx.send(cmd).await.is_err() {
            return Ok(());
        }
    }
}

/// Read one line, giving up if the backend is gone. `None` means stop.
async fn prompt(
    input: &mut Input,
    cmd_tx: &mpsc::Sender<AppCommand>,
    label: &str,
) -> Result<Option<String>> {
    use std::io::Write;
    print!("{}", label);
    std::io::stdout().flush()?;

    tokio::select! {
        line = input.next_line() => Ok(line?),
        _ = cmd_tx.closed() => Ok(None),
    }
}

async fn fetch_peers(cmd_tx: &mpsc::Sender<AppCommand>) -> Vec<Peer> {
    let (reply, rx) = oneshot::channel();
    if cmd_tx.send(AppCommand::ListPeers { reply }).await.is_err() {
        return Vec::new();
    }
    rx.await.unwrap_or_default()
}

fn print_peers(peers: &[Peer]) {
    if peers.is_empty() {
        println!("No peers found yet");
        return;
    }
    for (i, peer) in peers.iter().enumerate() {
        println!("{}. {} ({})", i + 1, peer.name, peer.address);
    }
}

async fn ask_send(
    input: &mut Input,
    cmd_tx: &mpsc::Sender<AppCommand>,
) -> Result<Option<AppCommand>> {
    let peers = fetch_peers(cmd_tx).await;
    if peers.is_empty() {
        println!("No peers found yet");
        return Ok(None);
    }

    let Some(path) = prompt(input, cmd_tx, "File path: ").await? else {
        return Ok(None);
    };
    let path = PathBuf::from(path.trim());
    if !path.is_file() {
        println!("Not a file: {}", path.display());
        return Ok(None);
    }

    print_peers(&peers);
    let Some(selection) = prompt(input, cmd_tx, "Recipients (e.g. 1,3): ").await? else {
        return Ok(None);
    };

    match parse_selection(&selection, peers.len()) {
        Ok(indices) => Ok(Some(AppCommand::SendFile {
            path,
            targets: indices.into_iter().map(|i| peers[i].address).collect(),
        })),
        Err(e) => {
            println!("{}", e);
            Ok(None)
        }
    }
}

/// Turn `"1, 3"` into zero-based indices, dropping duplicates
pub fn parse_selection(input: &str, count: usize) -> Result<Vec<usize>, String> {
    let mut indices = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let n: usize = part
            .parse()
            .map_err(|_| format!("Not a number: {:?}", part))?;
        if n == 0 || n > count {
            return Err(format!("No peer number {}", n));
        }
        if !indices.contains(&(n - 1)) {
            indices.push(n - 1);
        }
    }

    if indices.is_empty() {
        return Err("No recipients selected".to_string());
    }
    Ok(indices)
}
