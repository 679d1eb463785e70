//! Typed wrapper over an external write-ahead log.
//!
//! The WAL engine itself lives outside this crate: it is assumed to
//! durably record update sets and to re-deliver anything still uncommitted
//! after a crash. `Wal` is the narrow seam this crate needs from it,
//! mirroring how the rest of this codebase reaches storage only through
//! the `StorageBackend` trait rather than a concrete file type.

use crate::codec::WalUpdate;
use crate::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Opaque handle to a transaction that has been durably recorded by the WAL
/// but not yet signaled as applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalTransactionHandle(pub(crate) u64);

/// The seam a `RefCounter` uses to stage its mutations durably.
///
/// Implementations must serialize their own transactions: the WAL is shared
/// by every `RefCounter` in a process.
pub trait Wal: Send + Sync {
    /// Durably records `updates` as a pending transaction and returns a
    /// handle to it.
    fn begin_transaction(&self, updates: Vec<WalUpdate>) -> Result<WalTransactionHandle, Error>;

    /// Releases the WAL's reservation for `handle` once its updates have
    /// been reflected on disk.
    fn signal_applied(&self, handle: WalTransactionHandle) -> Result<(), Error>;

    /// Returns any transactions the WAL still holds as uncommitted, for
    /// crash recovery on startup. The updates in each transaction must be
    /// re-applied idempotently by the caller, then acknowledged via
    /// `signal_applied`.
    fn recover_pending(&self) -> Result<Vec<(WalTransactionHandle, Vec<WalUpdate>)>, Error>;
}

/// A reference `Wal` that keeps transactions in memory.
///
/// This is the fake used throughout this crate's own tests; it is exported
/// because a minimal in-memory WAL is useful to any caller exercising
/// `RefCounter` without wiring up a real durable log.
pub struct InMemoryWal {
    next_id: AtomicU64,
    pending: Mutex<Vec<(WalTransactionHandle, Vec<WalUpdate>)>>,
}

impl Default for InMemoryWal {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWal {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(Vec::new()),
        }
    }
}

impl Wal for InMemoryWal {
    fn begin_transaction(&self, updates: Vec<WalUpdate>) -> Result<WalTransactionHandle, Error> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = WalTransactionHandle(id);
        self.pending.lock().unwrap().push((handle, updates));
        Ok(handle)
    }

    fn signal_applied(&self, handle: WalTransactionHandle) -> Result<(), Error> {
        self.pending.lock().unwrap().retain(|(h, _)| *h != handle);
        Ok(())
    }

    fn recover_pending(&self) -> Result<Vec<(WalTransactionHandle, Vec<WalUpdate>)>, Error> {
        Ok(self.pending.lock().unwrap().clone())
    }
}
