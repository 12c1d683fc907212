use crate::AppEvent;
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::TransferError;
use super::protocol::{TransferHeader, read_ack, write_header};
use super::state::{Role, Transfer, TransferStatus};
use super::utils::{ThroughputMeter, TransferOptions, emit, read_chunk, report_failure, with_timeout};

/// Send one file to the receiver listening at `target`.
///
/// Returns the finished transfer (`Completed` or `Cancelled`). Failures are
/// logged, emitted as [`AppEvent::TransferFailed`] and returned as errors.
/// `cancel` is checked before every chunk; a cancelled send simply closes the
/// connection, which the receiver sees as a lost connection.
pub async fn send_file(
    path: &Path,
    target: SocketAddr,
    options: &TransferOptions,
    events: Option<&mpsc::Sender<AppEvent>>,
    cancel: &CancellationToken,
) -> Result<Transfer, TransferError> {
    let (mut stream, mut file, header) = match connect_and_handshake(path, target, options).await {
        Ok(parts) => parts,
        Err(e) => return Err(report_failure(events, Role::Sender, target, None, e).await),
    };

    let mut transfer = Transfer::new(Role::Sender, target, header.file_name, header.file_size);
    tracing::info!(
        "Sending {} ({} bytes) to {}",
        transfer.file_name,
        transfer.file_size,
        target
    );
    emit(events, AppEvent::TransferStarted(transfer.clone())).await;

    match stream_file(&mut stream, &mut file, &mut transfer, options, events, cancel).await {
        Ok(status) => {
            transfer.finish(status);
            if status == TransferStatus::Cancelled {
                tracing::info!("Upload of {} to {} stopped", transfer.file_name, target);
                emit(events, AppEvent::TransferCancelled(transfer.clone())).await;
            } else {
                tracing::info!("File {} sent to {}", transfer.file_name, target);
                emit(events, AppEvent::TransferCompleted(transfer.clone())).await;
            }
            Ok(transfer)
        }
        Err(e) => {
            transfer.finish(TransferStatus::Failed);
            Err(report_failure(events, Role::Sender, target, Some(transfer), e).await)
        }
    }
}

async fn open_source(path: &Path) -> Result<(File, TransferHeader), TransferError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?;

    let file = File::open(path).await?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(TransferError::NotAFile(path.to_path_buf()));
    }

    let header = TransferHeader::new(file_name, metadata.len())?;
    Ok((file, header))
}

async fn connect_and_handshake(
    path: &Path,
    target: SocketAddr,
    options: &TransferOptions,
) -> Result<(TcpStream, File, TransferHeader), TransferError> {
    let (file, header) = open_source(path).await?;

    let mut stream = with_timeout(options.connect_timeout, "connecting", async {
        TcpStream::connect(target).await.map_err(TransferError::from)
    })
    .await?;

    with_timeout(
        options.io_timeout,
        "sending header",
        write_header(&mut stream, &header),
    )
    .await?;
    with_timeout(
        options.io_timeout,
        "waiting for acknowledgement",
        read_ack(&mut stream),
    )
    .await?;

    Ok((stream, file, header))
}

/// Stream exactly `file_size` bytes; never more even if the file grew
async fn stream_file(
    stream: &mut TcpStream,
    file: &mut File,
    transfer: &mut Transfer,
    options: &TransferOptions,
    events: Option<&mpsc::Sender<AppEvent>>,
    cancel: &CancellationToken,
) -> Result<TransferStatus, TransferError> {
    let meter = ThroughputMeter::start();
    let mut buffer = vec![0u8; options.chunk_size];

    // Covers empty files, which never enter the chunk loop
    if cancel.is_cancelled() {
        return Ok(TransferStatus::Cancelled);
    }

    while transfer.remaining() > 0 {
        if cancel.is_cancelled() {
            return Ok(TransferStatus::Cancelled);
        }

        let want = transfer.remaining().min(buffer.len() as u64) as usize;
        let n = read_chunk(file, &mut buffer[..want]).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "source file shrank while sending ({}/{} bytes)",
                    transfer.bytes_moved(),
                    transfer.file_size
                ),
            )
            .into());
        }

        with_timeout(options.io_timeout, "sending data", async {
            stream
                .write_all(&buffer[..n])
                .await
                .map_err(TransferError::from)
        })
        .await?;

        transfer.advance(n as u64);
        emit(events, AppEvent::TransferProgress(meter.sample(transfer))).await;
    }

    with_timeout(options.io_timeout, "closing connection", async {
        stream.shutdown().await.map_err(TransferError::from)
    })
    .await?;

    Ok(TransferStatus::Completed)
}
