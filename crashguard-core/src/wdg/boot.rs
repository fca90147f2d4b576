//! Cross-Reset Boot Escalation
//!
//! ## Overview
//!
//! If initialization itself is what crashes, the hardware watchdog becomes
//! the problem: it resets the board, init crashes again, and the loop never
//! ends. The escape hatch is a failure counter that survives warm resets:
//!
//! - every boot increments the counter;
//! - a successful initialization resets it to zero;
//! - once it reaches [`MAX_INIT_FAILS`](crate::config::wdg::MAX_INIT_FAILS),
//!   the boot path stops arming the hardware watchdog, granting unbounded
//!   time to finish (or debug) initialization.
//!
//! The counter lives in a [`BootState`] block placed in memory excluded
//! from startup zero-initialization. After a true power-on that block is
//! garbage; validity is decided by checksum alone, never by an "initialized"
//! flag, because a flag would itself be garbage that occasionally looks
//! set. An invalid block is reset in place and treated exactly like a
//! power-on.
//!
//! A non-watchdog reset (pin, power, software) also clears the counter:
//! only watchdog-forced reboots count as evidence that startup is failing.

use crate::config::{boot, wdg};
use crate::errors::Result;
use crate::processor::ResetCause;
use crate::wdg::HardwareWatchdog;

/// Boot-survival block: magic, failure counter, rolling checksum.
///
/// Lives in no-init memory on real targets; the layout is fixed because
/// the block must stay readable across firmware updates that share the
/// same RAM placement.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct BootState {
    magic: u32,
    failed_inits: u32,
    check: u32,
}

impl BootState {
    /// A fresh, valid block with the counter at zero.
    ///
    /// Real targets never construct one directly; they validate whatever
    /// the no-init section holds. Hosts and tests start from this.
    pub const fn new() -> Self {
        let mut state = Self {
            magic: boot::MAGIC,
            failed_inits: 0,
            check: 0,
        };
        state.check = state.compute_check();
        state
    }

    /// Rolling checksum over the payload words.
    const fn compute_check(&self) -> u32 {
        let mut check = boot::CHECK_SEED;
        check = check.rotate_left(1) ^ self.magic;
        check = check.rotate_left(1) ^ self.failed_inits;
        check
    }

    /// Recompute the checksum after a payload change.
    fn commit(&mut self) {
        self.check = self.compute_check();
    }

    /// Check integrity; reset to a fresh block if it fails.
    ///
    /// Returns `true` when the block carried valid state from a prior
    /// session, `false` when it was garbage (true power-on or corruption)
    /// and has been re-initialized with the counter at zero.
    pub fn validate(&mut self) -> bool {
        if self.magic == boot::MAGIC && self.check == self.compute_check() {
            return true;
        }
        *self = Self::new();
        false
    }

    /// Consecutive boots without a success signal.
    pub fn failed_inits(&self) -> u32 {
        self.failed_inits
    }

    /// Overwrite the failure counter (operator test hook).
    pub fn set_failed_inits(&mut self, count: u32) {
        self.failed_inits = count;
        self.commit();
    }
}

impl Default for BootState {
    fn default() -> Self {
        Self::new()
    }
}

/// Boot-time watchdog arming with escalation. Runs before general
/// initialization.
///
/// Validates `state`, clears the counter unless this boot was forced by
/// the hardware watchdog, then arms the watchdog with the generous init
/// timeout — except when the counter has already reached the configured
/// maximum, in which case the watchdog is deliberately left off. The
/// counter is incremented in every case, including when arming fails, so
/// a boot loop with a broken watchdog peripheral still escalates.
///
/// Returns whether the hardware watchdog was armed.
pub fn start_for_init(
    state: &mut BootState,
    cause: &ResetCause,
    hardware: &mut dyn HardwareWatchdog,
) -> Result<bool> {
    state.validate();
    if !cause.independent_watchdog {
        // Any reset we did not force ends the failure streak.
        state.set_failed_inits(0);
    }

    let fails = state.failed_inits();
    let arm = wdg::MAX_INIT_FAILS == 0 || fails < wdg::MAX_INIT_FAILS;
    let started = if arm {
        hardware.start(wdg::INIT_TIMEOUT_MS)
    } else {
        Ok(())
    };

    state.set_failed_inits(fails.saturating_add(1));
    started.map(|()| arm)
}

/// Signal that initialization completed: the failure streak is over.
pub fn init_succeeded(state: &mut BootState) {
    state.set_failed_inits(0);
}
