//! Error Taxonomy for Crash Handling and Supervision
//!
//! ## Design Philosophy
//!
//! The whole crate shares one small error enum rather than per-module error
//! types:
//!
//! 1. **Stable numeric codes**: every variant maps to a fixed small negative
//!    integer via [`Error::code`]. Console commands and host tooling report
//!    these codes, so they are part of the external interface and must never
//!    be renumbered.
//!
//! 2. **No payload**: errors cross the panic path and interrupt context,
//!    where carrying context is a liability. The accompanying log line, not
//!    the error value, carries detail.
//!
//! 3. **Copy semantics**: results are checked immediately and sometimes
//!    stored in registers across a busy-wait; `Copy` keeps that free.
//!
//! ## Propagation Policy
//!
//! Outside the panic path, callers check every `Result` and report upward;
//! nothing in this crate retries on its own. Inside the panic path errors are
//! logged best-effort and the sequence continues regardless — once a panic is
//! underway, losing diagnostic data beats getting stuck.

use thiserror_no_std::Error;

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Operation errors - kept small and payload-free for embedded use
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument failed validation (bad alignment, out of range, unparseable)
    #[error("invalid argument")]
    InvalidArg,

    /// A conflicting operation is already in progress
    #[error("operation in progress")]
    Busy,

    /// The device reported a fault or failed to reach an expected state
    #[error("peripheral error")]
    Peripheral,

    /// Reference to a client or device index that does not exist
    #[error("no such instance")]
    BadInstance,

    /// Internal invariant violation, e.g. an unmapped address
    #[error("internal error")]
    Internal,

    /// Module accessed before it was configured
    #[error("not ready")]
    NotReady,
}

impl Error {
    /// Stable signed integer code for console and tooling output.
    ///
    /// `0` is reserved for success by convention; all errors are negative.
    pub const fn code(self) -> i32 {
        match self {
            Error::InvalidArg => -1,
            Error::Busy => -2,
            Error::Peripheral => -3,
            Error::BadInstance => -4,
            Error::Internal => -5,
            Error::NotReady => -6,
        }
    }
}

/// Console output is a peripheral like any other; a formatter failure from
/// a command handler surfaces as [`Error::Peripheral`].
impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Error::Peripheral
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::InvalidArg => defmt::write!(fmt, "invalid argument"),
            Error::Busy => defmt::write!(fmt, "operation in progress"),
            Error::Peripheral => defmt::write!(fmt, "peripheral error"),
            Error::BadInstance => defmt::write!(fmt, "no such instance"),
            Error::Internal => defmt::write!(fmt, "internal error"),
            Error::NotReady => defmt::write!(fmt, "not ready"),
        }
    }
}
