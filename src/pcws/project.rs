//! Outer discovery handle for a single chunk: owns the current worker
//! state, triggers regeneration, and serializes concurrent refresh
//! attempts.

use crate::gouging::{self, AllowanceConfig};
use crate::pcws::state::PcwsWorkerState;
use crate::signal::{self, WakeSignal};
use crate::worker_pool::{ErasureCoder, HasSectorOutcome, MasterKey, PieceRoot, Worker, WorkerKey, WorkerPool};
use crate::Error;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Immutable description of the chunk a `ProjectedChunkWorkerSet` discovers
/// workers for.
pub struct ChunkDescriptor {
    pub chunk_index: u64,
    pub piece_roots: Vec<PieceRoot>,
    pub erasure_coder: Arc<dyn ErasureCoder>,
    pub master_key: MasterKey,
}

/// Timing and policy knobs, carried as parameters rather than hard-coded.
#[derive(Clone)]
pub struct PcwsOptions {
    /// Bounds a single discovery pass (`pcwsHasSectorTimeout`).
    pub has_sector_timeout: Duration,
    /// Minimum age of the current generation before a refresh is allowed
    /// (`pcwsWorkerStateResetTime`).
    pub worker_state_reset_time: Duration,
    /// Gouging policy applied to every worker queried.
    pub gouging: AllowanceConfig,
}

/// How often the gather loop re-checks the deadline and shutdown signal.
const GATHER_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Outer {
    update_in_progress: bool,
    launch_time: Option<Instant>,
    waiters: Vec<SyncSender<()>>,
}

/// `Fresh` / `Refreshing` / `Ready` projection of a `ProjectedChunkWorkerSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcwsState {
    Fresh,
    Refreshing,
    Ready,
}

/// Discovers which workers hold which erasure-coded pieces of a chunk,
/// refreshing that mapping periodically via scatter/gather.
pub struct ProjectedChunkWorkerSet {
    descriptor: ChunkDescriptor,
    pool: Arc<dyn WorkerPool>,
    options: PcwsOptions,
    worker_state: ArcSwap<PcwsWorkerState>,
    outer: Mutex<Outer>,
    shutdown: Arc<AtomicBool>,
}

struct RawResponse {
    worker: WorkerKey,
    availables: Result<Vec<bool>, ()>,
}

impl ProjectedChunkWorkerSet {
    /// Constructs a new handle and forces an initial refresh before
    /// returning, matching `newPCWSByRoots`'s single legacy exception for
    /// one-of-one erasure coding.
    pub fn new_pcws_by_roots(
        pool: Arc<dyn WorkerPool>,
        descriptor: ChunkDescriptor,
        options: PcwsOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Arc<Self>, Error> {
        let num_pieces = descriptor.erasure_coder.num_pieces();
        let min_pieces = descriptor.erasure_coder.min_pieces();
        let legacy_single_piece = descriptor.piece_roots.len() == 1 && min_pieces == 1;
        if descriptor.piece_roots.len() != num_pieces && !legacy_single_piece {
            return Err(Error::InvalidChunkDescriptor(format!(
                "chunk has {} piece roots but the erasure coder expects {}",
                descriptor.piece_roots.len(),
                num_pieces
            )));
        }

        let pcws = Arc::new(Self {
            descriptor,
            pool,
            options,
            worker_state: ArcSwap::new(Arc::new(PcwsWorkerState::new())),
            outer: Mutex::new(Outer {
                update_in_progress: false,
                launch_time: None,
                waiters: Vec::new(),
            }),
            shutdown,
        });
        pcws.try_update_worker_state()?;
        Ok(pcws)
    }

    /// The currently installed worker state generation.
    pub fn worker_state(&self) -> Arc<PcwsWorkerState> {
        self.worker_state.load_full()
    }

    /// When the currently installed generation was produced, or `None` if
    /// no refresh has completed yet.
    pub fn launch_time(&self) -> Option<Instant> {
        self.outer.lock().unwrap().launch_time
    }

    /// `Fresh` / `Refreshing` / `Ready`.
    pub fn state(&self) -> PcwsState {
        let outer = self.outer.lock().unwrap();
        if outer.update_in_progress {
            PcwsState::Refreshing
        } else if outer.launch_time.is_none() {
            PcwsState::Fresh
        } else {
            PcwsState::Ready
        }
    }

    /// Single-flight refresh of the worker state.
    ///
    /// If the current generation is still within its reset interval and no
    /// refresh is in flight, this is a no-op: the installed generation is
    /// already good enough. If a refresh is already in flight, waits for it
    /// to finish instead of starting a second one — at most one new
    /// generation is produced per reset interval regardless of how many
    /// callers invoke this concurrently.
    pub fn try_update_worker_state(self: &Arc<Self>) -> Result<(), Error> {
        let join_existing: Option<WakeSignal> = {
            let mut outer = self.outer.lock().unwrap();
            if outer.update_in_progress {
                let (tx, sig) = WakeSignal::pair();
                outer.waiters.push(tx);
                Some(sig)
            } else {
                let now = Instant::now();
                let still_fresh = outer
                    .launch_time
                    .is_some_and(|t| now.duration_since(t) < self.options.worker_state_reset_time);
                if still_fresh {
                    return Ok(());
                }
                outer.update_in_progress = true;
                None
            }
        };

        if let Some(sig) = join_existing {
            sig.wait();
            return Ok(());
        }

        let new_state = Arc::new(PcwsWorkerState::new());
        let (launched_tx, launched_sig) = WakeSignal::pair();
        let this = Arc::clone(self);
        let state_for_task = Arc::clone(&new_state);

        let spawned = thread::Builder::new()
            .name(format!("pcws-discover-chunk-{}", self.descriptor.chunk_index))
            .spawn(move || this.find_workers(launched_tx, state_for_task));

        match spawned {
            Ok(_handle) => {
                launched_sig.wait();
                let mut outer = self.outer.lock().unwrap();
                outer.update_in_progress = false;
                outer.launch_time = Some(Instant::now());
                let mut waiters = std::mem::take(&mut outer.waiters);
                drop(outer);
                self.worker_state.store(new_state);
                signal::fire_all(&mut waiters);
                Ok(())
            }
            Err(e) => {
                let mut outer = self.outer.lock().unwrap();
                outer.update_in_progress = false;
                let mut waiters = std::mem::take(&mut outer.waiters);
                drop(outer);
                signal::fire_all(&mut waiters);
                crate::log_error!("could not spawn discovery task for chunk {}: {e}", self.descriptor.chunk_index);
                Err(Error::WorkerLaunchFailed(format!(
                    "could not spawn discovery task: {e}"
                )))
            }
        }
    }

    /// Runs detached: snapshots the worker pool, launches a has-sector job
    /// per worker, fires `launched_tx` once every launch attempt has been
    /// made, then gathers responses until every launched job has resolved,
    /// the timeout expires, or shutdown is requested.
    fn find_workers(self: Arc<Self>, launched_tx: SyncSender<()>, state: Arc<PcwsWorkerState>) {
        let deadline = Instant::now() + self.options.has_sector_timeout;
        let workers = self.pool.snapshot();
        let num_workers = workers.len() as u64;
        let (resp_tx, resp_rx) = mpsc::channel::<RawResponse>();

        let mut launched = 0usize;
        for worker in workers {
            match self.launch_worker(worker, num_workers, resp_tx.clone(), &state) {
                Ok(()) => launched += 1,
                Err(e) => {
                    crate::log_warn!("has-sector launch failed, skipping worker: {e}");
                }
            }
        }
        drop(resp_tx);

        let _ = launched_tx.send(());

        let mut responded = 0usize;
        while responded < launched {
            let now = Instant::now();
            if now >= deadline || self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            let wait = (deadline - now).min(GATHER_POLL_INTERVAL);
            match resp_rx.recv_timeout(wait) {
                Ok(resp) => {
                    state.handle_response(resp.worker, resp.availables);
                    responded += 1;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Gouging-checks and enqueues a has-sector job on `worker`, recording
    /// it as unresolved. Spawns a short-lived thread that blocks on the
    /// job's ticket and forwards the outcome onto the shared response
    /// channel, which is unbounded so that thread never blocks even if the
    /// gather loop has already returned.
    fn launch_worker(
        &self,
        worker: Arc<dyn Worker>,
        num_workers: u64,
        resp_tx: mpsc::Sender<RawResponse>,
        state: &Arc<PcwsWorkerState>,
    ) -> Result<(), Error> {
        let price_table = worker.price_table();
        gouging::check_gouging(
            &price_table,
            &self.options.gouging,
            num_workers,
            self.descriptor.piece_roots.len() as u64,
        )?;

        let ticket = worker.queue_has_sector_job(self.descriptor.piece_roots.clone())?;
        state.insert_unresolved(Arc::clone(&worker), ticket.expected_complete_time);

        let key = worker.key();
        thread::spawn(move || {
            let raw = match ticket.receiver.recv() {
                Ok(HasSectorOutcome { availables, err: None }) => {
                    RawResponse { worker: key, availables: Ok(availables) }
                }
                Ok(HasSectorOutcome { err: Some(_), .. }) | Err(_) => {
                    RawResponse { worker: key, availables: Err(()) }
                }
            };
            let _ = resp_tx.send(raw);
        });
        Ok(())
    }
}
