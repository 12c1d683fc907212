//! Handshake framing shared by sender and receiver.
//!
//! The sender opens with `"<file_name>:<file_size>"` (UTF-8, no length prefix,
//! no terminator) and the receiver answers with the two bytes `OK`. After
//! that the connection carries exactly `file_size` raw bytes.
//!
//! The header is split on the first `:`, so file names containing a colon
//! cannot be transferred. Senders refuse them before connecting.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::{ACK, MAX_HEADER_LEN};
use super::error::TransferError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub file_name: String,
    pub file_size: u64,
}

impl TransferHeader {
    /// Build a header for sending, rejecting names the wire format cannot carry
    pub fn new(file_name: impl Into<String>, file_size: u64) -> Result<Self, TransferError> {
        let file_name = file_name.into();
        if file_name.is_empty() {
            return Err(TransferError::InvalidFileName("empty file name".to_string()));
        }
        if file_name.contains(':') {
            return Err(TransferError::InvalidFileName(format!(
                "{} (':' is not allowed in transferred file names)",
                file_name
            )));
        }
        Ok(Self {
            file_name,
            file_size,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{}:{}", self.file_name, self.file_size).into_bytes()
    }

    /// Parse a received header, splitting on the first `:`
    pub fn parse(data: &[u8]) -> Result<Self, TransferError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| TransferError::MalformedHeader("not valid UTF-8".to_string()))?;

        let (file_name, size) = text.split_once(':').ok_or_else(|| {
            TransferError::MalformedHeader(format!("missing ':' separator in {:?}", text))
        })?;

        if file_name.is_empty() {
            return Err(TransferError::MalformedHeader("empty file name".to_string()));
        }

        let file_size = size.parse::<u64>().map_err(|_| {
            TransferError::MalformedHeader(format!("invalid file size {:?}", size))
        })?;

        Ok(Self {
            file_name: file_name.to_string(),
            file_size,
        })
    }
}

pub async fn write_header<W>(writer: &mut W, header: &TransferHeader) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&header.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the header as the first read on the connection
pub async fn read_header<R>(reader: &mut R) -> Result<TransferHeader, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MAX_HEADER_LEN];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Err(TransferError::MalformedHeader(
            "connection closed before header".to_string(),
        ));
    }
    TransferHeader::parse(&buf[..n])
}

pub async fn write_ack<W>(writer: &mut W) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(ACK).await?;
    writer.flush().await?;
    Ok(())
}

/// Wait for the receiver's `OK`; anything else, or EOF, is a rejection
pub async fn read_ack<R>(reader: &mut R) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut reply = [0u8; ACK.len()];
    let mut filled = 0;
    while filled < reply.len() {
        let n = reader.read(&mut reply[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if &reply[..filled] == ACK {
        Ok(())
    } else {
        Err(TransferError::HandshakeRejected {
            reply: String::from_utf8_lossy(&reply[..filled]).into_owned(),
        })
    }
}
