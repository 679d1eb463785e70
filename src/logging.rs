//! Structured logging facade.
//!
//! Gated behind the `logging` feature (an optional dependency on `log`),
//! matching how this codebase elsewhere keeps `log` optional rather than
//! a hard dependency. When the feature is off, call sites still type-check
//! (via `format_args!`) but emit nothing.

#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}
#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

#[cfg(feature = "logging")]
macro_rules! log_error {
    ($($arg:tt)*) => { log::error!($($arg)*) };
}
#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if false {
            let _ = format_args!($($arg)*);
        }
    };
}

pub(crate) use {log_debug, log_error, log_warn};
