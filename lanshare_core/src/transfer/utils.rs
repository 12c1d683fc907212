use crate::AppEvent;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use super::constants::{
    CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IO_TIMEOUT_SECS, ELAPSED_FLOOR_SECS,
    MAX_FILENAME_LENGTH,
};
use super::error::TransferError;
use super::state::{Progress, Role, Transfer};

const FALLBACK_FILE_NAME: &str = "unknown_file";

/// Tuning shared by sender and receiver
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub chunk_size: usize,
    /// `None` waits forever, like peers without timeouts do
    pub connect_timeout: Option<Duration>,
    /// Bound on each handshake step and each chunk read/write
    pub io_timeout: Option<Duration>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            connect_timeout: Some(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
            io_timeout: Some(Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS)),
        }
    }
}

/// Forward an event if anyone is listening; a closed channel is ignored
pub(crate) async fn emit(events: Option<&mpsc::Sender<AppEvent>>, event: AppEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

/// Log a failed transfer, tell the listener, and hand the error back
pub(crate) async fn report_failure(
    events: Option<&mpsc::Sender<AppEvent>>,
    role: Role,
    peer: SocketAddr,
    transfer: Option<Transfer>,
    error: TransferError,
) -> TransferError {
    tracing::error!("{} failed ({}): {}", role, peer, error);
    emit(
        events,
        AppEvent::TransferFailed {
            role,
            peer,
            transfer,
            reason: error.to_string(),
        },
    )
    .await;
    error
}

/// Await `fut`, failing with `TimedOut(what)` once `limit` elapses
pub async fn with_timeout<T, F>(
    limit: Option<Duration>,
    what: &'static str,
    fut: F,
) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransferError::TimedOut(what))?,
        None => fut.await,
    }
}

/// Fill `buf` from `reader`, stopping early only at EOF
pub async fn read_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Create (or truncate) a received file, owner-only on Unix
pub async fn open_receive_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    options.open(path).await
}

/// Speed in MB/s and ETA in seconds, MB being 1024*1024 bytes
pub fn throughput(bytes_moved: u64, total: u64, elapsed_secs: f64) -> (f64, f64) {
    const MB: f64 = 1024.0 * 1024.0;

    let elapsed = elapsed_secs + ELAPSED_FLOOR_SECS;
    let speed = bytes_moved as f64 / MB / elapsed;
    let eta = if speed > 0.0 {
        total.saturating_sub(bytes_moved) as f64 / MB / speed
    } else {
        0.0
    };
    (speed, eta)
}

/// Clock for the progress figures of one transfer
pub struct ThroughputMeter {
    started: Instant,
}

impl ThroughputMeter {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn sample(&self, transfer: &Transfer) -> Progress {
        let (throughput_mbps, eta_secs) = throughput(
            transfer.bytes_moved(),
            transfer.file_size,
            self.started.elapsed().as_secs_f64(),
        );

        Progress {
            transfer_id: transfer.id,
            role: transfer.role,
            peer: transfer.peer,
            file_name: transfer.file_name.clone(),
            bytes_moved: transfer.bytes_moved(),
            file_size: transfer.file_size,
            fraction: transfer.fraction(),
            throughput_mbps,
            eta_secs,
        }
    }
}

/// Reduce an announced file name to a single safe path component
pub fn sanitize_file_name(file_name: &str) -> String {
    // Last component only, whatever the sender's path separator was
    let last = file_name.rsplit(['/', '\\']).next().unwrap_or_default();

    let clean: String = last.chars().filter(|c| !c.is_control()).collect();

    if clean.trim().is_empty() || clean == "." || clean == ".." || is_reserved_name(&clean) {
        return FALLBACK_FILE_NAME.to_string();
    }

    if clean.len() <= MAX_FILENAME_LENGTH {
        return clean;
    }

    // Keep a reasonable extension when shortening
    match clean.rfind('.') {
        Some(idx) if clean.len() - idx < 20 => {
            let ext = &clean[idx..];
            let mut base = clean[..idx].to_string();
            truncate_at_char_boundary(&mut base, MAX_FILENAME_LENGTH - ext.len());
            base.push_str(ext);
            base
        }
        _ => {
            let mut clean = clean;
            truncate_at_char_boundary(&mut clean, MAX_FILENAME_LENGTH);
            clean
        }
    }
}

// See: https://learn.microsoft.com/en-us/windows/win32/fileio/naming-a-file
fn is_reserved_name(name: &str) -> bool {
    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| name.eq_ignore_ascii_case(r))
}

fn truncate_at_char_boundary(s: &mut String, max_len: usize) {
    let mut cutoff = max_len.min(s.len());
    while !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s.truncate(cutoff);
}
