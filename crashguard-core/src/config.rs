//! Compile-Time Configuration
//!
//! ## Overview
//!
//! All tunable values live here as constants so the rest of the crate never
//! hides a magic number. There is deliberately no runtime configuration:
//! crash handling must work before any config store is readable, and the
//! panic path cannot afford indirection.
//!
//! Values that identify persisted data (`magic::*`, `boot::CHECK_SEED`,
//! `stack::FILL_PATTERN`) are part of the on-flash / in-RAM format and must
//! not change between firmware versions that share a diagnostic region, or
//! the offline decoder and the persistence-skip check will no longer
//! recognize old records.

/// Section and record identification words.
///
/// Each persisted section starts with one of these magics followed by a
/// 32-bit section length, which is what lets a decoder walk the region
/// without knowing record sizes in advance.
pub mod magic {
    /// First word of a persisted [`FaultSnapshot`](crate::record::FaultSnapshot).
    pub const FAULT: u32 = 0xDEAD_0001;

    /// First word of a persisted trace buffer image.
    pub const TRACE: u32 = 0xF00D_0001;

    /// First word of the end marker terminating the diagnostic region.
    pub const END: u32 = 0xC0DA_0001;
}

/// Stack guard and usage measurement.
pub mod stack {
    /// Pattern painted over unused stack at startup.
    ///
    /// The high-water scan looks for the first word that no longer holds
    /// this pattern; a value that real stack data is unlikely to contain
    /// keeps the measurement honest.
    pub const FILL_PATTERN: u32 = 0xCAFE_BADD;

    /// Size of the protected region at the lowest legal stack address.
    ///
    /// Kept to the smallest span common MPU hardware can protect so the
    /// guard costs almost no RAM.
    pub const GUARD_BYTES: u32 = 32;
}

/// Trace buffer defaults.
pub mod trace {
    /// Capacity of the global trace buffer's byte array.
    ///
    /// Header (16 bytes) + buffer must be a multiple of the largest
    /// supported write granularity (16), so the whole image can be
    /// programmed without padding. 1008 + 16 = 1024.
    pub const DEFAULT_CAPACITY: usize = 1008;
}

/// Watchdog supervision defaults.
pub mod wdg {
    /// Maximum number of software watchdog clients.
    pub const MAX_CLIENTS: usize = 8;

    /// Cadence of the supervisory check, in milliseconds.
    pub const CHECK_PERIOD_MS: u32 = 10;

    /// Hardware watchdog timeout used during normal operation.
    pub const HARD_TIMEOUT_MS: u32 = 4000;

    /// Hardware watchdog timeout used while the system initializes.
    ///
    /// Generous on purpose: startup legitimately takes longer than any
    /// steady-state stall we want to catch.
    pub const INIT_TIMEOUT_MS: u32 = 8000;

    /// Consecutive failed initializations after which the boot path stops
    /// arming the hardware watchdog, leaving unbounded time to debug.
    pub const MAX_INIT_FAILS: u32 = 3;
}

/// Persistent boot state identification.
pub mod boot {
    /// Magic identifying an initialized boot-state block.
    pub const MAGIC: u32 = 0xDEAD_DEAD;

    /// Seed for the rolling checksum over the boot-state words.
    pub const CHECK_SEED: u32 = 0xBAAD_CEED;
}
