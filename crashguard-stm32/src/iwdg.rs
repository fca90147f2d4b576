//! Independent Watchdog (IWDG) Backend
//!
//! ## Overview
//!
//! The IWDG runs off the dedicated LSI oscillator, so it keeps counting
//! through main-clock failures and low-power stops. Once the start key is
//! written the hardware cannot be stopped again short of a reset; `start`
//! may be called again to re-program the timeout (init window first, the
//! shorter run window once bring-up succeeds) but never to turn it off.
//!
//! ## Timeout Math
//!
//! The prescaler is fixed at /64: 32 kHz LSI / 64 = 500 counts per second,
//! 2 ms per count. A 12-bit reload caps the timeout at 8192 ms.

use crashguard_core::errors::{Error, Result};
use crashguard_core::wdg::HardwareWatchdog;

use crate::regs;

const KR_OFFSET: u32 = 0x00;
const PR_OFFSET: u32 = 0x04;
const RLR_OFFSET: u32 = 0x08;
const SR_OFFSET: u32 = 0x0C;

const KEY_FEED: u32 = 0xAAAA;
const KEY_ACCESS: u32 = 0x5555;
const KEY_START: u32 = 0xCCCC;

/// PR encoding for the fixed /64 prescaler.
const PRESCALER_DIV64: u32 = 0b100;

/// Counter ticks per second: 32 kHz LSI through /64.
const TICK_HZ: u32 = 500;

const RELOAD_MAX: u32 = 0xFFF;

/// PR/RLR writes cross into the LSI clock domain and SR reports until they
/// land. A bound this large only trips on broken hardware.
const UPDATE_POLL_LIMIT: u32 = 1_000_000;

/// Rounded reload value for a millisecond timeout.
///
/// `InvalidArg` past the 8192 ms hardware ceiling.
pub const fn timeout_to_reload(timeout_ms: u32) -> Result<u32> {
    let counts = (timeout_ms as u64 * TICK_HZ as u64 + 500) / 1000;
    if counts > (RELOAD_MAX + 1) as u64 {
        return Err(Error::InvalidArg);
    }
    if counts == 0 {
        return Ok(0);
    }
    Ok(counts as u32 - 1)
}

/// Independent watchdog peripheral.
#[derive(Debug)]
pub struct Iwdg {
    base: u32,
    started: bool,
}

impl Iwdg {
    /// Peripheral at the standard 0x4000_3000 APB address.
    pub const fn new() -> Self {
        Self::at(0x4000_3000)
    }

    /// Peripheral at a non-standard address.
    pub const fn at(base: u32) -> Self {
        Self {
            base,
            started: false,
        }
    }

    /// Freezes the counter while the core is halted by a debugger.
    ///
    /// Without this, sitting on a breakpoint longer than the timeout resets
    /// the target. Uses the DBGMCU APB1 freeze register of Cortex-M4 parts.
    pub fn freeze_on_debug(&self) {
        regs::modify(0xE004_2008, |v| v | (1 << 12));
    }

    fn kr(&self) -> u32 {
        self.base + KR_OFFSET
    }

    fn pr(&self) -> u32 {
        self.base + PR_OFFSET
    }

    fn rlr(&self) -> u32 {
        self.base + RLR_OFFSET
    }

    fn sr(&self) -> u32 {
        self.base + SR_OFFSET
    }
}

impl Default for Iwdg {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareWatchdog for Iwdg {
    /// Starts the counter, or re-programs the timeout of a running one.
    ///
    /// The counter runs from the first key write. A `Peripheral` error
    /// means the new reload could not be confirmed, not that the watchdog
    /// is off.
    fn start(&mut self, timeout_ms: u32) -> Result<()> {
        let reload = timeout_to_reload(timeout_ms)?;
        regs::write(self.kr(), KEY_START);
        regs::write(self.kr(), KEY_ACCESS);
        regs::write(self.pr(), PRESCALER_DIV64);
        regs::write(self.rlr(), reload);
        let mut polls = 0u32;
        while regs::read(self.sr()) != 0 {
            polls += 1;
            if polls >= UPDATE_POLL_LIMIT {
                return Err(Error::Peripheral);
            }
        }
        regs::write(self.kr(), KEY_FEED);
        self.started = true;
        Ok(())
    }

    fn feed(&mut self) {
        regs::write(self.kr(), KEY_FEED);
    }

    fn is_started(&self) -> bool {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_rounds_to_nearest_tick() {
        assert_eq!(timeout_to_reload(4000), Ok(1999));
        assert_eq!(timeout_to_reload(8000), Ok(3999));
        // 2 ms per count: odd milliseconds round up.
        assert_eq!(timeout_to_reload(3), Ok(1));
        assert_eq!(timeout_to_reload(1), Ok(0));
        assert_eq!(timeout_to_reload(0), Ok(0));
    }

    #[test]
    fn reload_stops_at_the_hardware_ceiling() {
        assert_eq!(timeout_to_reload(8192), Ok(0xFFF));
        assert_eq!(timeout_to_reload(8193), Err(Error::InvalidArg));
        assert_eq!(timeout_to_reload(u32::MAX), Err(Error::InvalidArg));
    }

    #[test]
    fn supervision_timeouts_fit_the_counter() {
        use crashguard_core::config::wdg;
        assert!(timeout_to_reload(wdg::HARD_TIMEOUT_MS).is_ok());
        assert!(timeout_to_reload(wdg::INIT_TIMEOUT_MS).is_ok());
    }
}
