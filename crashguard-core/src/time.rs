//! Uptime tracking for supervision and crash stamps
//!
//! Everything in this crate measures time the same way: milliseconds since
//! boot, monotonic, never wall clock. Watchdog feed bookkeeping and the
//! uptime field of a fault snapshot both come from whatever tick counter the
//! platform already runs; this module only defines the contract and two
//! ready-made sources:
//! - [`FixedTime`] for tests and simulations (manually advanced)
//! - [`Uptime`] for host builds (monotonic clock, starts at zero)
//!
//! On target, the platform's periodic tick implements [`TimeSource`]
//! directly.

/// Milliseconds since boot.
pub type Timestamp = u64;

/// Source of monotonic uptime for the system
pub trait TimeSource {
    /// Current uptime in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Fixed time source for testing
///
/// Never advances on its own; tests move it explicitly between supervisory
/// checks to model stalls and feeds.
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
}

impl FixedTime {
    /// Create a source reporting `timestamp` until told otherwise.
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    /// Jump to an absolute uptime.
    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Move forward by `ms`.
    pub fn advance(&mut self, ms: u64) {
        self.timestamp += ms;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }
}

/// Host-side uptime source (requires std)
///
/// Reports milliseconds since construction, so host demos observe the same
/// starts-at-zero behavior a target tick counter has.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct Uptime {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl Uptime {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for Uptime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for Uptime {
    fn now(&self) -> Timestamp {
        self.start.elapsed().as_millis() as Timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_time_advances_only_when_told() {
        let mut t = FixedTime::new(100);
        assert_eq!(t.now(), 100);
        t.advance(50);
        assert_eq!(t.now(), 150);
        t.set(10);
        assert_eq!(t.now(), 10);
    }

    #[cfg(feature = "std")]
    #[test]
    fn uptime_is_monotonic() {
        let t = Uptime::new();
        let a = t.now();
        let b = t.now();
        assert!(b >= a);
    }
}
