//! Offline Decoder for CrashGuard Diagnostic Regions
//!
//! ## Overview
//!
//! When a device faults, the core crate persists a self-describing region:
//! a fault snapshot, the trace buffer image, and an end marker, each
//! section introduced by its own magic and length. It also mirrors the
//! same bytes to the console as a hex dump. This crate turns either form
//! back into something a human (or a script) can read:
//!
//! 1. **Input**: raw region bytes, or console hex-dump text captured from
//!    a terminal session. Dump lines are validated strictly: offsets must
//!    be contiguous from zero and every field must hold whole bytes. Lines
//!    that do not look like dump lines (prompts, log output) are ignored,
//!    so a raw copy-paste of a capture session usually decodes as-is.
//! 2. **Section walk**: the region is walked by magic + length using the
//!    same iterator the firmware uses, so the two sides cannot drift.
//! 3. **Rendering**: snapshot registers as a name/value table, trace
//!    events by looking ids up in an [`EventTable`], optionally the whole
//!    report as JSON for tooling.
//!
//! ## Trace Event Tables
//!
//! The trace ring stores one id byte plus raw argument bytes per event;
//! the id-to-arguments mapping lives on the host. [`EventTable`] carries
//! that mapping: the built-in entries cover the firmware's `trace-test`
//! events, application events are added from JSON definitions. Decoding
//! starts at the write cursor (the oldest byte) and may need to skip a
//! partially overwritten entry first; the decoder searches for the start
//! offset that yields the fewest unknown ids, the same heuristic the
//! original console tooling used.
//!
//! ## Example
//!
//! ```
//! use crashguard_core::record::{EndMarker, FaultKind, FaultSnapshot};
//! use crashguard_core::trace::TraceBuffer;
//! use crashguard_decoder::{decode_region, EventTable};
//!
//! // Region bytes as the firmware would persist them.
//! let mut ring: TraceBuffer<16> = TraceBuffer::new();
//! ring.record(0xF0, &[]);
//! let mut region = Vec::new();
//! region.extend_from_slice(FaultSnapshot::new(FaultKind::Software.as_u32(), 7).as_bytes());
//! region.extend_from_slice(ring.image());
//! region.extend_from_slice(EndMarker::new().as_bytes());
//!
//! let report = decode_region(&region, &EventTable::with_test_events()).unwrap();
//! assert_eq!(report.snapshot.unwrap().param, 7);
//! assert!(report.complete);
//! ```

#![warn(missing_docs)]

pub mod dump;
pub mod events;
pub mod report;
pub mod trace;

pub use dump::{parse_hex_dump, region_from_file_bytes};
pub use events::{EventSpec, EventTable};
pub use report::{decode_region, RegionReport, SnapshotReport};
pub use trace::{DecodedEvent, TraceReport};

/// Decoder errors.
#[derive(Debug, thiserror_no_std::Error)]
pub enum DecodeError {
    /// A hex-dump line failed validation.
    #[error("hex dump line {line}: {reason}")]
    HexDump {
        /// 1-based line number in the input text.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// An event id was defined twice.
    #[error("duplicate event id {0:#04x}")]
    DuplicateEvent(u8),

    /// An event definition is unusable.
    #[error("invalid event definition: {0}")]
    InvalidEvent(String),

    /// Event definitions failed to parse as JSON.
    #[error("event definitions: {0}")]
    EventJson(String),

    /// A trace section's header contradicts its length.
    #[error("malformed trace section: {0}")]
    MalformedTrace(String),
}
