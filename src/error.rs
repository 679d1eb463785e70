use std::fmt;
use std::io;

/// Errors produced by the sector ledger and chunk worker discovery engine.
///
/// Every fallible operation in this crate returns one of these variants with
/// enough context to act on; none are swallowed internally. The single
/// exception is per-worker launch failure inside chunk discovery, which is
/// logged and skipped rather than propagated (see `pcws::project`).
#[derive(Debug)]
pub enum Error {
    /// Sector index is out of range for the counter's current length.
    InvalidSectorNumber { index: u64, num_sectors: u64 },
    /// Counter file header does not carry the recognized version tag.
    InvalidVersion,
    /// A WAL update payload was truncated or otherwise malformed.
    InvalidUpdate(String),
    /// A mutating call was made with no open update session.
    UpdateWithoutUpdateSession,
    /// A mutating call, or `start_update`, was made after deletion was
    /// staged or applied.
    UpdateAfterDelete,
    /// `increment` would carry a counter past `u16::MAX`.
    CounterOverflow { index: u64 },
    /// `decrement` would carry a counter below zero.
    CounterUnderflow { index: u64 },
    /// `LoadRefCounter` was asked to open a file that does not exist.
    NotFound(String),
    /// A has-sector query would exceed the configured allowance.
    GougingDetected(String),
    /// The chunk discovery task could not be scheduled.
    WorkerLaunchFailed(String),
    /// A chunk descriptor's piece roots do not match its erasure coder.
    InvalidChunkDescriptor(String),
    /// An underlying file or WAL failure, with its originating error kept
    /// for `source()`.
    IOError(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidSectorNumber { index, num_sectors } => write!(
                f,
                "sector index {index} out of range for counter of length {num_sectors}"
            ),
            Error::InvalidVersion => write!(f, "counter file header carries an unrecognized version"),
            Error::InvalidUpdate(reason) => write!(f, "malformed WAL update: {reason}"),
            Error::UpdateWithoutUpdateSession => {
                write!(f, "mutating call made without an open update session")
            }
            Error::UpdateAfterDelete => {
                write!(f, "mutating call made after the ref counter was deleted")
            }
            Error::CounterOverflow { index } => {
                write!(f, "sector {index} counter would overflow past u16::MAX")
            }
            Error::CounterUnderflow { index } => {
                write!(f, "sector {index} counter would underflow past zero")
            }
            Error::NotFound(path) => write!(f, "counter file not found: {path}"),
            Error::GougingDetected(reason) => write!(f, "gouging detected: {reason}"),
            Error::WorkerLaunchFailed(reason) => write!(f, "worker launch failed: {reason}"),
            Error::InvalidChunkDescriptor(reason) => write!(f, "invalid chunk descriptor: {reason}"),
            Error::IOError(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IOError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IOError(err)
    }
}
