//! Read-only facade over the remote worker pool.
//!
//! The RPC transport and the worker pool's own management live outside
//! this crate; this module only defines the seam `pcws` needs: a worker's
//! identity and price table, and a way to enqueue a has-sector job and
//! learn when it completes.

use crate::gouging::HostPriceTable;
use crate::Error;
use std::sync::mpsc::Receiver;
use std::time::Instant;

/// Identifies a remote worker (host). Opaque beyond equality and hashing;
/// this crate never interprets the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerKey(pub [u8; 32]);

/// A Merkle root identifying one erasure-coded piece of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceRoot(pub [u8; 32]);

/// Opaque per-chunk encryption key, consumed only through this interface;
/// the cipher itself lives outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterKey(pub [u8; 32]);

/// The erasure coding scheme for a chunk.
pub trait ErasureCoder: Send + Sync {
    /// Total number of pieces a chunk is split into.
    fn num_pieces(&self) -> usize;
    /// Minimum number of pieces needed to reconstruct a chunk.
    fn min_pieces(&self) -> usize;
}

/// The terminal outcome of one has-sector job, as delivered by a worker's
/// job queue.
#[derive(Debug, Clone)]
pub struct HasSectorOutcome {
    /// `availables[i]` is true iff the worker reports holding the piece at
    /// `piece_roots[i]` in the originating request. Empty on error.
    pub availables: Vec<bool>,
    /// Set if the job failed; `availables` is empty in that case.
    pub err: Option<String>,
}

/// A ticket returned immediately by `Worker::queue_has_sector_job`: an
/// estimate of when the job will complete, and the channel its eventual
/// result arrives on.
pub struct HasSectorTicket {
    pub expected_complete_time: Instant,
    pub receiver: Receiver<HasSectorOutcome>,
}

/// A single remote worker (host).
pub trait Worker: Send + Sync {
    fn key(&self) -> WorkerKey;
    fn price_table(&self) -> HostPriceTable;

    /// Enqueues a has-sector job for `piece_roots` on this worker's job
    /// queue and returns immediately with a ticket; the job's result
    /// arrives later on the ticket's channel.
    fn queue_has_sector_job(&self, piece_roots: Vec<PieceRoot>) -> Result<HasSectorTicket, Error>;
}

/// Read-only view of the current worker pool.
pub trait WorkerPool: Send + Sync {
    /// A point-in-time snapshot of every worker currently in the pool.
    /// Must be safe to call concurrently from any number of `pcws`
    /// instances.
    fn snapshot(&self) -> Vec<std::sync::Arc<dyn Worker>>;
}
