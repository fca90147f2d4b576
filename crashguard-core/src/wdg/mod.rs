//! Two-Tier Watchdog Supervision
//!
//! ## Overview
//!
//! Liveness is guarded at two independent levels:
//!
//! - **Software clients**: each long-running task registers a feed period
//!   and must call [`Supervisor::feed`] at least that often. A periodic
//!   [`Supervisor::check`] measures every client; the first one found
//!   stalled is reported to a trigger callback that is expected to enter
//!   the crash path and never return.
//! - **Hardware timer**: a free-running countdown on an independent clock,
//!   behind the [`HardwareWatchdog`] trait. The supervisory check feeds it
//!   only when *no* client is stalled, so hardware liveness is transitively
//!   contingent on the scheduler, the timer service and every client all
//!   doing their jobs.
//!
//! The hardware layer is also armed across resets with an escalating
//! failure counter; that logic lives in [`boot`].
//!
//! ## Check Cadence
//!
//! [`Supervisor::check`] is driven by the system's periodic timer at
//! [`CHECK_PERIOD_MS`](crate::config::wdg::CHECK_PERIOD_MS); the hardware
//! timeout leaves two orders of magnitude of slack over that cadence, so a
//! single late tick never causes a spurious hardware reset.

pub mod boot;

use heapless::Vec;

use crate::errors::{Error, Result};
use crate::time::Timestamp;

/// Independent hardware countdown timer.
///
/// On the reference targets this is the IWDG; hosts use a mock. Real
/// implementations are irreversible: once started, only regular feeding
/// prevents a reset.
pub trait HardwareWatchdog {
    /// Arm the timer with `timeout_ms`. Fails `InvalidArg` if the timeout
    /// cannot be encoded, `Peripheral` if the device never acknowledges.
    fn start(&mut self, timeout_ms: u32) -> Result<()>;

    /// Reload the countdown. Harmless when not started.
    fn feed(&mut self);

    /// Whether the timer has been armed.
    fn is_started(&self) -> bool;
}

/// One registered software client.
#[derive(Debug, Clone, Copy)]
struct Client {
    id: usize,
    period_ms: u32,
    last_feed: Timestamp,
}

/// Public view of a registered client, for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientStatus {
    /// Client id.
    pub id: usize,
    /// Required feed period in milliseconds.
    pub period_ms: u32,
    /// Timestamp of the most recent feed.
    pub last_feed: Timestamp,
}

/// Result of one supervisory check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CheckOutcome {
    /// Id of the first stalled client, if any.
    pub stalled: Option<usize>,
    /// Whether the hardware watchdog was fed this cycle.
    pub hardware_fed: bool,
}

/// Software watchdog: up to `MAX` clients with individual feed periods.
///
/// Client ids double as capacity slots, so they must be `< MAX`. The
/// supervisor holds no time source of its own; callers pass `now` in,
/// which keeps every path deterministic under test.
pub struct Supervisor<const MAX: usize> {
    clients: Vec<Client, MAX>,
    trigger: Option<fn(usize)>,
    check_enabled: bool,
    fail_hardware: bool,
}

/// Supervisor sized by [`wdg::MAX_CLIENTS`](crate::config::wdg::MAX_CLIENTS).
pub type SystemSupervisor = Supervisor<{ crate::config::wdg::MAX_CLIENTS }>;

impl<const MAX: usize> Supervisor<MAX> {
    /// Empty supervisor with checking enabled and no trigger.
    pub const fn new() -> Self {
        Self {
            clients: Vec::new(),
            trigger: None,
            check_enabled: true,
            fail_hardware: false,
        }
    }

    /// Register client `id` with a required feed period, counting from
    /// `now`. Re-registering an existing id updates its period and resets
    /// its feed clock.
    pub fn register(&mut self, id: usize, period_ms: u32, now: Timestamp) -> Result<()> {
        if id >= MAX {
            return Err(Error::BadInstance);
        }
        if period_ms == 0 {
            return Err(Error::InvalidArg);
        }
        if let Some(client) = self.clients.iter_mut().find(|c| c.id == id) {
            client.period_ms = period_ms;
            client.last_feed = now;
            return Ok(());
        }
        self.clients
            .push(Client {
                id,
                period_ms,
                last_feed: now,
            })
            .map_err(|_| Error::Internal)
    }

    /// Record a feed for client `id` at `now`.
    pub fn feed(&mut self, id: usize, now: Timestamp) -> Result<()> {
        match self.clients.iter_mut().find(|c| c.id == id) {
            Some(client) => {
                client.last_feed = now;
                Ok(())
            }
            None => Err(Error::BadInstance),
        }
    }

    /// Install the stall callback. Expected to enter the crash path and
    /// never return; anything it does instead happens with the hardware
    /// watchdog unfed.
    pub fn set_trigger(&mut self, trigger: fn(usize)) {
        self.trigger = Some(trigger);
    }

    /// Test hook: pretend the hardware watchdog is broken by skipping its
    /// feed. A started hardware timer will then reset the system.
    pub fn set_fail_hardware(&mut self, fail: bool) {
        self.fail_hardware = fail;
    }

    /// Test hook: suspend client checking. The hardware watchdog keeps
    /// being fed so the system stays up while stalls are being provoked.
    pub fn set_check_enabled(&mut self, enabled: bool) {
        self.check_enabled = enabled;
    }

    /// Whether client checking is active.
    pub fn is_check_enabled(&self) -> bool {
        self.check_enabled
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Iterate registered clients in registration order.
    pub fn clients(&self) -> impl Iterator<Item = ClientStatus> + '_ {
        self.clients.iter().map(|c| ClientStatus {
            id: c.id,
            period_ms: c.period_ms,
            last_feed: c.last_feed,
        })
    }

    /// One supervisory cycle at time `now`.
    ///
    /// Finds the first client whose elapsed time exceeds its period and
    /// hands its id to the trigger. The hardware watchdog is fed only when
    /// no client is stalled (and the fail-hardware hook is off); with
    /// checking suspended it is fed unconditionally.
    pub fn check(&mut self, now: Timestamp, hardware: &mut dyn HardwareWatchdog) -> CheckOutcome {
        if self.check_enabled {
            let stalled = self
                .clients
                .iter()
                .find(|c| now.saturating_sub(c.last_feed) > c.period_ms as Timestamp)
                .map(|c| c.id);
            if let Some(id) = stalled {
                if let Some(trigger) = self.trigger {
                    // Does not return in production.
                    trigger(id);
                }
                return CheckOutcome {
                    stalled: Some(id),
                    hardware_fed: false,
                };
            }
        }
        if self.fail_hardware {
            return CheckOutcome {
                stalled: None,
                hardware_fed: false,
            };
        }
        hardware.feed();
        CheckOutcome {
            stalled: None,
            hardware_fed: true,
        }
    }
}

impl<const MAX: usize> Default for Supervisor<MAX> {
    fn default() -> Self {
        Self::new()
    }
}

/// Scripted hardware watchdog for host tests and demos.
#[derive(Debug, Default)]
pub struct MockWatchdog {
    started_with: Option<u32>,
    starts: u32,
    feeds: u32,
    fail_start: bool,
}

impl MockWatchdog {
    /// Unstarted mock that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent [`HardwareWatchdog::start`] calls fail `Peripheral`.
    pub fn set_fail_start(&mut self, fail: bool) {
        self.fail_start = fail;
    }

    /// Timeout passed to the most recent successful start.
    pub fn started_with(&self) -> Option<u32> {
        self.started_with
    }

    /// Number of successful starts.
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// Number of feeds.
    pub fn feeds(&self) -> u32 {
        self.feeds
    }
}

impl HardwareWatchdog for MockWatchdog {
    fn start(&mut self, timeout_ms: u32) -> Result<()> {
        if self.fail_start {
            return Err(Error::Peripheral);
        }
        self.started_with = Some(timeout_ms);
        self.starts += 1;
        Ok(())
    }

    fn feed(&mut self) {
        self.feeds += 1;
    }

    fn is_started(&self) -> bool {
        self.started_with.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_out_of_range_ids_and_zero_periods() {
        let mut sup: Supervisor<4> = Supervisor::new();
        assert_eq!(sup.register(4, 100, 0), Err(Error::BadInstance));
        assert_eq!(sup.register(0, 0, 0), Err(Error::InvalidArg));
        assert_eq!(sup.register(3, 100, 0), Ok(()));
        assert_eq!(sup.client_count(), 1);
    }

    #[test]
    fn reregistering_updates_in_place() {
        let mut sup: Supervisor<4> = Supervisor::new();
        sup.register(1, 100, 0).unwrap();
        sup.register(1, 250, 40).unwrap();
        assert_eq!(sup.client_count(), 1);
        let client = sup.clients().next().unwrap();
        assert_eq!(client.period_ms, 250);
        assert_eq!(client.last_feed, 40);
    }

    #[test]
    fn feeding_an_unknown_client_is_bad_instance() {
        let mut sup: Supervisor<4> = Supervisor::new();
        assert_eq!(sup.feed(2, 10), Err(Error::BadInstance));
    }

    #[test]
    fn healthy_clients_feed_the_hardware() {
        let mut sup: Supervisor<4> = Supervisor::new();
        let mut hw = MockWatchdog::new();
        sup.register(0, 100, 0).unwrap();
        sup.register(1, 200, 0).unwrap();

        let outcome = sup.check(90, &mut hw);
        assert_eq!(outcome.stalled, None);
        assert!(outcome.hardware_fed);
        assert_eq!(hw.feeds(), 1);
    }

    #[test]
    fn elapsed_equal_to_period_is_not_a_stall() {
        let mut sup: Supervisor<4> = Supervisor::new();
        let mut hw = MockWatchdog::new();
        sup.register(0, 100, 0).unwrap();
        assert_eq!(sup.check(100, &mut hw).stalled, None);
        assert_eq!(sup.check(101, &mut hw).stalled, Some(0));
    }

    #[test]
    fn stall_skips_the_hardware_feed() {
        let mut sup: Supervisor<4> = Supervisor::new();
        let mut hw = MockWatchdog::new();
        sup.register(0, 100, 0).unwrap();
        sup.register(1, 200, 0).unwrap();
        sup.register(2, 500, 0).unwrap();

        // Feed 0 and 2 on time; client 1 goes quiet.
        sup.feed(0, 150).unwrap();
        sup.feed(2, 150).unwrap();
        sup.feed(0, 240).unwrap();

        let outcome = sup.check(250, &mut hw);
        assert_eq!(outcome.stalled, Some(1));
        assert!(!outcome.hardware_fed);
        assert_eq!(hw.feeds(), 0);
    }

    #[test]
    fn trigger_fires_once_with_the_stalled_id() {
        use core::sync::atomic::{AtomicUsize, Ordering};
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        static LAST_ID: AtomicUsize = AtomicUsize::new(usize::MAX);
        fn on_stall(id: usize) {
            CALLS.fetch_add(1, Ordering::Relaxed);
            LAST_ID.store(id, Ordering::Relaxed);
        }

        let mut sup: Supervisor<4> = Supervisor::new();
        let mut hw = MockWatchdog::new();
        sup.set_trigger(on_stall);
        sup.register(0, 100, 0).unwrap();
        sup.register(1, 200, 0).unwrap();
        sup.feed(0, 150).unwrap();

        sup.check(201, &mut hw);
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
        assert_eq!(LAST_ID.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn disabled_check_still_feeds_the_hardware() {
        let mut sup: Supervisor<4> = Supervisor::new();
        let mut hw = MockWatchdog::new();
        sup.register(0, 100, 0).unwrap();
        sup.set_check_enabled(false);

        // Client 0 is long overdue, but checking is off.
        let outcome = sup.check(10_000, &mut hw);
        assert_eq!(outcome.stalled, None);
        assert!(outcome.hardware_fed);
        assert_eq!(hw.feeds(), 1);
    }

    #[test]
    fn fail_hardware_hook_starves_the_hardware() {
        let mut sup: Supervisor<4> = Supervisor::new();
        let mut hw = MockWatchdog::new();
        sup.set_fail_hardware(true);

        let outcome = sup.check(0, &mut hw);
        assert_eq!(outcome.stalled, None);
        assert!(!outcome.hardware_fed);
        assert_eq!(hw.feeds(), 0);
    }

    #[test]
    fn time_going_backwards_does_not_stall() {
        let mut sup: Supervisor<4> = Supervisor::new();
        let mut hw = MockWatchdog::new();
        sup.register(0, 100, 500).unwrap();
        // A check stamped before the registration must not underflow.
        assert_eq!(sup.check(400, &mut hw).stalled, None);
    }
}
