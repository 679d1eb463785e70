//! Crash-safe per-sector reference counting and projected chunk worker set
//! discovery for a decentralized storage client's renter.
//!
//! Two subsystems live here:
//!
//! - [`refcounter`]: a persistent, per-sector reference count for a single
//!   file-contract, mutated through WAL-backed update sessions.
//! - [`pcws`]: a concurrent engine that discovers which remote workers hold
//!   which erasure-coded pieces of a chunk, refreshed on a schedule via
//!   scatter/gather.

mod logging;

mod codec;
mod error;
mod signal;

pub(crate) use logging::{log_debug, log_error, log_warn};

pub mod gouging;
pub mod pcws;
pub mod refcounter;
pub mod wal;
pub mod worker_pool;

pub use codec::WalUpdate;
pub use error::Error;

/// Convenience result alias used throughout this crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
