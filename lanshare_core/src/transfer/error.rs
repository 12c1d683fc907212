use std::path::PathBuf;
use thiserror::Error;

/// Why a transfer ended in `Failed`.
///
/// Cancellation is not an error; it is reported through
/// [`TransferStatus::Cancelled`](super::TransferStatus::Cancelled).
#[derive(Error, Debug)]
pub enum TransferError {
    /// Receiver answered something other than `OK`, or closed the connection
    #[error("handshake rejected by receiver (reply: {reply:?})")]
    HandshakeRejected { reply: String },

    /// Sender closed the connection before the announced size arrived
    #[error("connection lost after {received}/{expected} bytes")]
    ConnectionLost { received: u64, expected: u64 },

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("malformed transfer header: {0}")]
    MalformedHeader(String),

    #[error("timed out while {0}")]
    TimedOut(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
