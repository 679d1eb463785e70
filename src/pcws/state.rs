//! Per-generation unresolved/resolved worker set for one chunk discovery
//! pass.

use crate::signal::{self, WakeSignal};
use crate::worker_pool::{Worker, WorkerKey};
use std::collections::HashMap;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A worker whose has-sector job for this generation has not yet resolved.
#[derive(Clone)]
pub struct PcwsUnresolvedWorker {
    pub worker: Arc<dyn Worker>,
    pub expected_complete_time: Instant,
}

/// A resolved has-sector response: the indices (into the chunk's piece
/// roots) the worker claims to hold.
#[derive(Clone)]
pub struct PcwsWorkerResponse {
    pub worker: WorkerKey,
    pub piece_indices: Vec<usize>,
}

struct Inner {
    unresolved: HashMap<WorkerKey, PcwsUnresolvedWorker>,
    resolved: Vec<PcwsWorkerResponse>,
    update_chans: Vec<SyncSender<()>>,
}

/// One generation of worker discovery state for a chunk.
///
/// Holds only weak observational references to workers — it never mutates
/// them. A `ProjectedChunkWorkerSet` exclusively owns its current
/// generation; prior generations remain valid for any holder still reading
/// them once replaced.
pub struct PcwsWorkerState {
    inner: Mutex<Inner>,
}

impl Default for PcwsWorkerState {
    fn default() -> Self {
        Self::new()
    }
}

impl PcwsWorkerState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                unresolved: HashMap::new(),
                resolved: Vec::new(),
                update_chans: Vec::new(),
            }),
        }
    }

    /// Registers a wake-up for the next change to this generation.
    ///
    /// Once `unresolved` is empty, no further change is possible, so this
    /// returns an already-fired signal instead of registering a new one.
    pub fn register_for_worker_update(&self) -> WakeSignal {
        let mut inner = self.inner.lock().unwrap();
        if inner.unresolved.is_empty() {
            return WakeSignal::fired();
        }
        let (tx, sig) = WakeSignal::pair();
        inner.update_chans.push(tx);
        sig
    }

    /// Number of workers whose has-sector job has not yet resolved.
    pub fn unresolved_count(&self) -> usize {
        self.inner.lock().unwrap().unresolved.len()
    }

    /// A clone of every response resolved so far, in arrival order.
    pub fn resolved_snapshot(&self) -> Vec<PcwsWorkerResponse> {
        self.inner.lock().unwrap().resolved.clone()
    }

    /// Records that `worker`'s has-sector job was launched and is awaiting
    /// a response.
    pub(crate) fn insert_unresolved(&self, worker: Arc<dyn Worker>, expected_complete_time: Instant) {
        let key = worker.key();
        let mut inner = self.inner.lock().unwrap();
        inner
            .unresolved
            .insert(key, PcwsUnresolvedWorker { worker, expected_complete_time });
    }

    /// Moves `worker` from unresolved to resolved and wakes every
    /// registered waiter. `availables` is `Err` when the job failed, which
    /// resolves to an empty piece-index list.
    pub(crate) fn handle_response(&self, worker: WorkerKey, availables: Result<Vec<bool>, ()>) {
        let mut inner = self.inner.lock().unwrap();
        inner.unresolved.remove(&worker);
        signal::fire_all(&mut inner.update_chans);
        let piece_indices = match availables {
            Ok(flags) => flags
                .into_iter()
                .enumerate()
                .filter_map(|(i, available)| available.then_some(i))
                .collect(),
            Err(()) => Vec::new(),
        };
        inner.resolved.push(PcwsWorkerResponse { worker, piece_indices });
    }
}
