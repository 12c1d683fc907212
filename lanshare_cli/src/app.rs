use lanshare_core::AppEvent;
use lanshare_core::transfer::{Progress, Role};
use std::io::Write;
use tokio::sync::mpsc;

/// Print backend events until the backend goes away
pub async fn print_events(mut event_rx: mpsc::Receiver<AppEvent>) {
    while let Some(event) = event_rx.recv().await {
        match &event {
            AppEvent::TransferProgress(progress) => {
                print!("\r{}", format_progress(progress));
                let _ = std::io::stdout().flush();
            }
            other => {
                if let Some(line) = describe(other) {
                    println!("\n{}", line);
                }
            }
        }
    }
}

/// `Sending to 192.168.1.7: 45.1% | 2.10 MB/s | ETA: 1.2s`
pub fn format_progress(progress: &Progress) -> String {
    let direction = match progress.role {
        Role::Sender => "Sending to",
        Role::Receiver => "Receiving from",
    };
    format!(
        "{} {}: {:.1}% | {:.2} MB/s | ETA: {:.1}s",
        direction,
        progress.peer.ip(),
        progress.fraction * 100.0,
        progress.throughput_mbps,
        progress.eta_secs
    )
}

/// One line for every event except progress
pub fn describe(event: &AppEvent) -> Option<String> {
    let line = match event {
        AppEvent::Status(msg) => msg.clone(),
        AppEvent::Error(msg) => format!("[ERROR] {}", msg),
        AppEvent::TransferStarted(t) => match t.role {
            Role::Sender => format!("Sending {} to {}", t.file_name, t.peer.ip()),
            Role::Receiver => format!(
                "Receiving {} ({} bytes) from {}",
                t.file_name,
                t.file_size,
                t.peer.ip()
            ),
        },
        AppEvent::TransferCompleted(t) => match t.role {
            Role::Sender => format!("File sent: {} to {}", t.file_name, t.peer.ip()),
            Role::Receiver => format!("File received: {} from {}", t.file_name, t.peer.ip()),
        },
        AppEvent::TransferCancelled(t) => match t.role {
            Role::Sender => format!("Upload of {} stopped", t.file_name),
            Role::Receiver => format!("Download of {} stopped", t.file_name),
        },
        AppEvent::TransferFailed {
            role, peer, reason, ..
        } => format!("{} failed ({}): {}", role, peer.ip(), reason),
        AppEvent::TransferProgress(_) => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanshare_core::transfer::Transfer;

    fn sample(role: Role) -> Progress {
        let transfer = Transfer::new(role, "192.168.1.7:5001".parse().unwrap(), "a.bin", 1000);
        Progress {
            transfer_id: transfer.id,
            role,
            peer: transfer.peer,
            file_name: transfer.file_name,
            bytes_moved: 451,
            file_size: 1000,
            fraction: 0.451,
            throughput_mbps: 2.1,
            eta_secs: 1.23,
        }
    }

    #[test]
    fn test_format_progress() {
        assert_eq!(
            format_progress(&sample(Role::Sender)),
            "Sending to 192.168.1.7: 45.1% | 2.10 MB/s | ETA: 1.2s"
        );
        assert!(format_progress(&sample(Role::Receiver)).starts_with("Receiving from"));
    }

    #[test]
    fn test_describe_outcomes() {
        let peer = "10.0.0.2:5001".parse().unwrap();
        let failed = AppEvent::TransferFailed {
            role: Role::Sender,
            peer,
            transfer: None,
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            describe(&failed).unwrap(),
            "send failed (10.0.0.2): connection refused"
        );

        let done = Transfer::new(Role::Sender, peer, "report.txt", 10);
        assert_eq!(
            describe(&AppEvent::TransferCompleted(done)).unwrap(),
            "File sent: report.txt to 10.0.0.2"
        );
    }
}
