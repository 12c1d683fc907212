use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => write!(f, "send"),
            Role::Receiver => write!(f, "receive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::InProgress)
    }
}

/// One file moving over one connection.
///
/// Created once the handshake succeeds and owned by the task running the
/// streaming loop; callers only ever see clones.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub id: Uuid,
    pub role: Role,
    pub peer: SocketAddr,
    pub file_name: String,
    pub file_size: u64,
    bytes_moved: u64,
    status: TransferStatus,
}

impl Transfer {
    pub fn new(role: Role, peer: SocketAddr, file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            peer,
            file_name: file_name.into(),
            file_size,
            bytes_moved: 0,
            status: TransferStatus::InProgress,
        }
    }

    pub fn bytes_moved(&self) -> u64 {
        self.bytes_moved
    }

    pub fn remaining(&self) -> u64 {
        self.file_size - self.bytes_moved
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    /// Share of the file moved so far; an empty file counts as done
    pub fn fraction(&self) -> f64 {
        if self.file_size == 0 {
            1.0
        } else {
            self.bytes_moved as f64 / self.file_size as f64
        }
    }

    /// Count `n` more bytes, clamped to the file size
    pub(crate) fn advance(&mut self, n: u64) {
        if self.status.is_terminal() {
            return;
        }
        self.bytes_moved = self.bytes_moved.saturating_add(n).min(self.file_size);
    }

    /// Move to a terminal status. Returns false if already terminal.
    pub(crate) fn finish(&mut self, status: TransferStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}

/// Snapshot emitted after every chunk.
#[derive(Debug, Clone)]
pub struct Progress {
    pub transfer_id: Uuid,
    pub role: Role,
    pub peer: SocketAddr,
    pub file_name: String,
    pub bytes_moved: u64,
    pub file_size: u64,
    pub fraction: f64,
    pub throughput_mbps: f64,
    pub eta_secs: f64,
}
