//! Projected Chunk Worker Set: a concurrent discovery engine mapping
//! erasure-coded chunk pieces to the remote workers that hold them.

mod project;
mod state;

pub use project::{ChunkDescriptor, PcwsOptions, PcwsState, ProjectedChunkWorkerSet};
pub use state::{PcwsUnresolvedWorker, PcwsWorkerResponse, PcwsWorkerState};
