//! Supervision scenarios: mixed client health and boot-loop escalation.

use core::sync::atomic::{AtomicUsize, Ordering};

use crashguard_core::config::wdg;
use crashguard_core::processor::ResetCause;
use crashguard_core::time::{FixedTime, TimeSource};
use crashguard_core::wdg::boot::{init_succeeded, start_for_init, BootState};
use crashguard_core::wdg::{HardwareWatchdog, MockWatchdog, Supervisor};

static TRIGGER_CALLS: AtomicUsize = AtomicUsize::new(0);
static TRIGGER_ID: AtomicUsize = AtomicUsize::new(usize::MAX);

fn on_stall(id: usize) {
    TRIGGER_CALLS.fetch_add(1, Ordering::Relaxed);
    TRIGGER_ID.store(id, Ordering::Relaxed);
}

#[test]
fn one_quiet_client_among_healthy_ones_trips_the_trigger() {
    TRIGGER_CALLS.store(0, Ordering::Relaxed);
    let mut sup: Supervisor<8> = Supervisor::new();
    let mut hw = MockWatchdog::new();
    let mut clock = FixedTime::new(0);
    sup.set_trigger(on_stall);

    sup.register(0, 100, clock.now()).unwrap();
    sup.register(1, 200, clock.now()).unwrap();
    sup.register(2, 500, clock.now()).unwrap();

    // 20 supervisory cycles at the nominal cadence; clients 0 and 2 feed
    // on time, client 1 goes quiet after t=0.
    let mut stall_cycle = None;
    for cycle in 1..=20 {
        clock.advance(wdg::CHECK_PERIOD_MS as u64);
        let now = clock.now();
        sup.feed(0, now).unwrap();
        sup.feed(2, now).unwrap();

        let outcome = sup.check(now, &mut hw);
        match outcome.stalled {
            None => {
                assert!(outcome.hardware_fed);
                assert_eq!(hw.feeds(), cycle);
            }
            Some(id) => {
                assert_eq!(id, 1);
                assert!(!outcome.hardware_fed);
                stall_cycle = Some(cycle);
                break;
            }
        }
    }

    // 200 ms period at a 10 ms cadence: the 21st cycle would cross it, but
    // the loop ran only 20; elapsed is 200 at cycle 20, which is not > 200.
    assert_eq!(stall_cycle, None);
    assert_eq!(TRIGGER_CALLS.load(Ordering::Relaxed), 0);

    // One more cycle crosses the period.
    clock.advance(wdg::CHECK_PERIOD_MS as u64);
    let outcome = sup.check(clock.now(), &mut hw);
    assert_eq!(outcome.stalled, Some(1));
    assert!(!outcome.hardware_fed);
    assert_eq!(TRIGGER_CALLS.load(Ordering::Relaxed), 1);
    assert_eq!(TRIGGER_ID.load(Ordering::Relaxed), 1);
    assert_eq!(hw.feeds(), 20);
}

#[test]
fn recovered_client_stops_tripping() {
    let mut sup: Supervisor<8> = Supervisor::new();
    let mut hw = MockWatchdog::new();
    sup.register(0, 50, 0).unwrap();

    assert_eq!(sup.check(60, &mut hw).stalled, Some(0));
    sup.feed(0, 70).unwrap();
    assert_eq!(sup.check(100, &mut hw).stalled, None);
}

#[test]
fn boot_loop_escalates_then_recovers_after_success() {
    let mut state = BootState::new();
    let wdg_cause = ResetCause {
        raw: 1 << 29,
        independent_watchdog: true,
        ..ResetCause::default()
    };

    // Boot loop: init keeps dying, every reset is watchdog-forced.
    for expected in 1..=wdg::MAX_INIT_FAILS {
        let mut hw = MockWatchdog::new();
        let armed = start_for_init(&mut state, &wdg_cause, &mut hw).unwrap();
        assert!(armed);
        assert_eq!(hw.started_with(), Some(wdg::INIT_TIMEOUT_MS));
        assert_eq!(state.failed_inits(), expected);
    }

    // Next boot: limit reached, watchdog deliberately left off.
    let mut hw = MockWatchdog::new();
    let armed = start_for_init(&mut state, &wdg_cause, &mut hw).unwrap();
    assert!(!armed);
    assert!(!hw.is_started());

    // With unbounded time, init finally completes.
    init_succeeded(&mut state);
    assert_eq!(state.failed_inits(), 0);

    // The following boot arms normally again.
    let mut hw = MockWatchdog::new();
    let armed = start_for_init(&mut state, &wdg_cause, &mut hw).unwrap();
    assert!(armed);
    assert_eq!(state.failed_inits(), 1);
}

#[test]
fn power_on_after_watchdog_storm_starts_clean() {
    let mut state = BootState::new();
    let wdg_cause = ResetCause {
        raw: 1 << 29,
        independent_watchdog: true,
        ..ResetCause::default()
    };
    let mut hw = MockWatchdog::new();
    start_for_init(&mut state, &wdg_cause, &mut hw).unwrap();
    start_for_init(&mut state, &wdg_cause, &mut hw).unwrap();
    assert_eq!(state.failed_inits(), 2);

    // Power-on: the no-init block is garbage. Model that by corrupting the
    // checksum the way random RAM would.
    let mut garbage = BootState::new();
    garbage.set_failed_inits(2);
    let power_on = ResetCause {
        raw: 1 << 27,
        power_on: true,
        ..ResetCause::default()
    };
    let armed = start_for_init(&mut garbage, &power_on, &mut hw).unwrap();
    assert!(armed);
    assert_eq!(garbage.failed_inits(), 1);
}
