//! Crash resilience and supervision core for CrashGuard
//!
//! Detects fatal conditions (CPU exceptions, stalled tasks), captures a
//! diagnostic snapshot, persists it across the forced reset that follows,
//! and guards against silent hangs with a two-tier software + hardware
//! watchdog. A low-overhead circular trace buffer serves live diagnostics
//! and rides along in every persisted snapshot.
//!
//! Key constraints:
//! - No heap allocation anywhere; the panic path cannot trust the allocator
//! - Safe to call from interrupt context where documented
//! - Hardware access only through narrow traits, so everything here runs
//!   and tests on a host
//!
//! ```no_run
//! use crashguard_core::capture::persist;
//! use crashguard_core::nvm::device::NvmGeometry;
//! use crashguard_core::nvm::memory::MemNvm;
//! use crashguard_core::nvm::NvmDriver;
//! use crashguard_core::record::{FaultKind, FaultSnapshot};
//! use crashguard_core::trace;
//!
//! let geometry = NvmGeometry {
//!     base: 0,
//!     page_size: 2048,
//!     pages: 2,
//!     banks: 1,
//!     write_bytes: 8,
//! };
//! let mut driver = NvmDriver::new(MemNvm::<4096>::new(geometry));
//!
//! // Record a couple of events, then persist a snapshot with the trace.
//! trace::record(0x10, &[1, 2]);
//! let snapshot = FaultSnapshot::new(FaultKind::Software.as_u32(), 42);
//! trace::with_image(|image| {
//!     persist(&mut driver, 0, &snapshot, image).unwrap();
//! });
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod capture;
pub mod cmd;
pub mod config;
pub mod errors;
pub mod nvm;
pub mod processor;
pub mod record;
pub mod time;
pub mod trace;
pub mod wdg;

// Public API
pub use capture::{CaptureConfig, CaptureController, PersistOutcome};
pub use errors::{Error, Result};
pub use nvm::NvmDriver;
pub use processor::{Processor, ResetCause};
pub use record::{EndMarker, FaultKind, FaultSnapshot};
pub use trace::{SystemTraceBuffer, TraceBuffer};
pub use wdg::{HardwareWatchdog, Supervisor, SystemSupervisor};

/// Crate version, reported by the console's identify command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
