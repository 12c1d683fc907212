//! Table of running transfers and their cancellation tokens

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use super::state::Role;

struct Entry {
    role: Role,
    peer: IpAddr,
    token: CancellationToken,
}

#[derive(Default)]
pub struct ActiveTransfers {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl ActiveTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transfer and hand out its token.
    /// The entry lives as long as the returned guard.
    pub fn register(self: &Arc<Self>, role: Role, peer: IpAddr) -> ActiveTransferGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.entries.lock().insert(
            id,
            Entry {
                role,
                peer,
                token: token.clone(),
            },
        );

        ActiveTransferGuard {
            table: Arc::clone(self),
            id,
            token,
        }
    }

    /// Signal every transfer of `role`. Returns how many were signalled.
    pub fn cancel_all(&self, role: Role) -> usize {
        self.cancel_matching(|entry| entry.role == role)
    }

    /// Signal the transfers of `role` with one peer
    pub fn cancel_peer(&self, role: Role, peer: IpAddr) -> usize {
        self.cancel_matching(|entry| entry.role == role && entry.peer == peer)
    }

    /// Signal everything, used on shutdown
    pub fn cancel_everything(&self) -> usize {
        self.cancel_matching(|_| true)
    }

    fn cancel_matching(&self, matches: impl Fn(&Entry) -> bool) -> usize {
        let entries = self.entries.lock();
        let mut count = 0;
        for entry in entries.values().filter(|e| matches(e)) {
            entry.token.cancel();
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn count(&self, role: Role) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|e| e.role == role)
            .count()
    }
}

/// Unregisters its transfer when dropped
pub struct ActiveTransferGuard {
    table: Arc<ActiveTransfers>,
    id: u64,
    token: CancellationToken,
}

impl ActiveTransferGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ActiveTransferGuard {
    fn drop(&mut self) {
        self.table.entries.lock().remove(&self.id);
    }
}
