use crate::AppEvent;
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::TransferError;
use super::protocol::{read_header, write_ack};
use super::state::{Role, Transfer, TransferStatus};
use super::utils::{
    ThroughputMeter, TransferOptions, emit, open_receive_file, report_failure, sanitize_file_name,
    with_timeout,
};

/// Receive one file from an accepted connection into `receive_dir`.
///
/// On a lost connection or any other failure the partial file is deleted.
/// When `cancel` fires the loop stops at the next chunk boundary and the
/// partial file is left in place for the caller to deal with.
pub async fn receive_file<S>(
    stream: &mut S,
    peer: SocketAddr,
    receive_dir: &Path,
    options: &TransferOptions,
    events: Option<&mpsc::Sender<AppEvent>>,
    cancel: &CancellationToken,
) -> Result<Transfer, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = match with_timeout(options.io_timeout, "reading header", read_header(stream)).await
    {
        Ok(header) => header,
        Err(e) => return Err(report_failure(events, Role::Receiver, peer, None, e).await),
    };

    let file_name = sanitize_file_name(&header.file_name);
    if file_name != header.file_name {
        tracing::warn!(
            "Incoming file name {:?} from {} stored as {:?}",
            header.file_name,
            peer,
            file_name
        );
    }

    // An existing file of the same name is untouched until the sender has its ack
    if let Err(e) = with_timeout(options.io_timeout, "sending acknowledgement", write_ack(stream)).await
    {
        return Err(report_failure(events, Role::Receiver, peer, None, e).await);
    }

    let file_path = receive_dir.join(&file_name);
    let mut file = match create_target(receive_dir, &file_path).await {
        Ok(file) => file,
        Err(e) => return Err(report_failure(events, Role::Receiver, peer, None, e.into()).await),
    };

    let mut transfer = Transfer::new(Role::Receiver, peer, file_name, header.file_size);
    tracing::info!(
        "Receiving {} ({} bytes) from {}",
        transfer.file_name,
        transfer.file_size,
        peer
    );
    emit(events, AppEvent::TransferStarted(transfer.clone())).await;

    match stream_to_file(stream, &mut file, &mut transfer, options, events, cancel).await {
        Ok(status) => {
            transfer.finish(status);
            if status == TransferStatus::Cancelled {
                tracing::info!(
                    "Download of {} from {} stopped at {}/{} bytes, partial file kept at {}",
                    transfer.file_name,
                    peer,
                    transfer.bytes_moved(),
                    transfer.file_size,
                    file_path.display()
                );
                emit(events, AppEvent::TransferCancelled(transfer.clone())).await;
            } else {
                tracing::info!("Received file {} from {}", transfer.file_name, peer);
                emit(events, AppEvent::TransferCompleted(transfer.clone())).await;
            }
            Ok(transfer)
        }
        Err(e) => {
            discard_partial(file, &file_path).await;
            transfer.finish(TransferStatus::Failed);
            Err(report_failure(events, Role::Receiver, peer, Some(transfer), e).await)
        }
    }
}

async fn create_target(receive_dir: &Path, file_path: &Path) -> std::io::Result<File> {
    tokio::fs::create_dir_all(receive_dir).await?;
    open_receive_file(file_path).await
}

/// Read exactly `file_size` bytes, never past it
async fn stream_to_file<S>(
    stream: &mut S,
    file: &mut File,
    transfer: &mut Transfer,
    options: &TransferOptions,
    events: Option<&mpsc::Sender<AppEvent>>,
    cancel: &CancellationToken,
) -> Result<TransferStatus, TransferError>
where
    S: AsyncRead + Unpin,
{
    let meter = ThroughputMeter::start();
    let mut buffer = vec![0u8; options.chunk_size];

    // Covers empty files, which never enter the chunk loop
    if cancel.is_cancelled() {
        return Ok(TransferStatus::Cancelled);
    }

    while transfer.remaining() > 0 {
        if cancel.is_cancelled() {
            file.flush().await?;
            return Ok(TransferStatus::Cancelled);
        }

        let want = transfer.remaining().min(buffer.len() as u64) as usize;
        let n = with_timeout(options.io_timeout, "receiving data", async {
            stream
                .read(&mut buffer[..want])
                .await
                .map_err(TransferError::from)
        })
        .await?;

        if n == 0 {
            return Err(TransferError::ConnectionLost {
                received: transfer.bytes_moved(),
                expected: transfer.file_size,
            });
        }

        file.write_all(&buffer[..n]).await?;
        transfer.advance(n as u64);
        emit(events, AppEvent::TransferProgress(meter.sample(transfer))).await;
    }

    file.flush().await?;
    Ok(TransferStatus::Completed)
}

async fn discard_partial(mut file: File, file_path: &Path) {
    // Let pending writes land before the handle goes away
    let _ = file.flush().await;
    drop(file);

    match tokio::fs::remove_file(file_path).await {
        Ok(()) => tracing::info!("Incomplete file deleted: {}", file_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            "Could not delete incomplete file {}: {}",
            file_path.display(),
            e
        ),
    }
}
