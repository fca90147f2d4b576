//! Cortex-M Processor Backend
//!
//! ## Overview
//!
//! Implements [`Processor`] against the Cortex-M system control block, the
//! PMSAv7 MPU (Cortex-M3/M4/M7 parts) and the family's RCC reset-status
//! register. SCB and MPU addresses are architectural; only the reset-status
//! decode differs per family, captured in a [`ResetCauseMap`].
//!
//! The stack guard is one MPU region programmed over the lowest
//! `GUARD_BYTES` of the stack with all access denied. A push into it raises
//! MemManage/HardFault before the stack can silently run into other data.
//!
//! ## Host Builds
//!
//! Construction and reset-cause decoding are plain arithmetic. The
//! register-touching methods need a real core; host tests use
//! `MockProcessor` from the core crate instead.

#![allow(unsafe_code)]

use crashguard_core::config::stack::GUARD_BYTES;
use crashguard_core::processor::{FaultRegisters, Processor, ResetCause, StackRegion};
use crashguard_core::record::ExceptionFrame;

use crate::regs;

// System control block, fixed on every Cortex-M.
const ICSR: u32 = 0xE000_ED04;
const SHCSR: u32 = 0xE000_ED24;
const CFSR: u32 = 0xE000_ED28;
const HFSR: u32 = 0xE000_ED2C;
const MMFAR: u32 = 0xE000_ED34;
const BFAR: u32 = 0xE000_ED38;

/// VECTACTIVE field of ICSR: exception number currently executing.
const ICSR_VECTACTIVE: u32 = 0x1FF;

// PMSAv7 MPU registers.
const MPU_CTRL: u32 = 0xE000_ED94;
const MPU_RNR: u32 = 0xE000_ED98;
const MPU_RBAR: u32 = 0xE000_ED9C;
const MPU_RASR: u32 = 0xE000_EDA0;

const MPU_CTRL_ENABLE: u32 = 1 << 0;
/// Privileged code keeps the default memory map outside defined regions.
const MPU_CTRL_PRIVDEFENA: u32 = 1 << 2;

const RBAR_VALID: u32 = 1 << 4;
const RASR_ENABLE: u32 = 1 << 0;
const RASR_XN: u32 = 1 << 28;

/// MPU region index reserved for the stack guard.
const GUARD_REGION: u32 = 7;

/// RASR SIZE field encoding a power-of-two region of `bytes`.
const fn size_field(bytes: u32) -> u32 {
    31 - bytes.leading_zeros() - 1
}

/// Guard region attributes: no access from any privilege, never executable.
const fn guard_rasr() -> u32 {
    RASR_XN | (size_field(GUARD_BYTES) << 1) | RASR_ENABLE
}

/// Margin left untouched below the live stack pointer when painting.
const PAINT_MARGIN: u32 = 64;

/// Where a family keeps its reset-status flags and which bit means what.
///
/// A mask of zero means the family has no flag for that cause.
#[derive(Debug, Clone, Copy)]
pub struct ResetCauseMap {
    /// RCC CSR address.
    pub csr: u32,
    /// Write-one bit that clears all sticky flags.
    pub clear: u32,
    /// Low-power management reset flag.
    pub low_power: u32,
    /// Window watchdog reset flag.
    pub window_watchdog: u32,
    /// Independent watchdog reset flag.
    pub independent_watchdog: u32,
    /// Software reset flag.
    pub software: u32,
    /// Power-on reset flag.
    pub power_on: u32,
    /// Reset pin flag.
    pub pin: u32,
    /// Brown-out reset flag.
    pub brown_out: u32,
}

impl ResetCauseMap {
    /// STM32L4: brown-out doubles as power-on, no separate POR flag.
    pub const L4: Self = Self {
        csr: 0x4002_1094,
        clear: 1 << 23,
        low_power: 1 << 31,
        window_watchdog: 1 << 30,
        independent_watchdog: 1 << 29,
        software: 1 << 28,
        power_on: 0,
        pin: 1 << 26,
        brown_out: 1 << 27,
    };

    /// STM32F4.
    pub const F4: Self = Self {
        csr: 0x4002_3874,
        clear: 1 << 24,
        low_power: 1 << 31,
        window_watchdog: 1 << 30,
        independent_watchdog: 1 << 29,
        software: 1 << 28,
        power_on: 1 << 27,
        pin: 1 << 26,
        brown_out: 1 << 25,
    };

    /// STM32U5, non-secure RCC map.
    pub const U5: Self = Self {
        csr: 0x4602_0C00 + 0x1C4,
        clear: 1 << 23,
        low_power: 1 << 31,
        window_watchdog: 1 << 30,
        independent_watchdog: 1 << 29,
        software: 1 << 28,
        power_on: 0,
        pin: 1 << 26,
        brown_out: 1 << 27,
    };
}

/// Decode raw reset-status bits through a family map.
pub fn decode_reset_cause(raw: u32, map: &ResetCauseMap) -> ResetCause {
    let on = |mask: u32| mask != 0 && raw & mask != 0;
    ResetCause {
        raw,
        low_power: on(map.low_power),
        window_watchdog: on(map.window_watchdog),
        independent_watchdog: on(map.independent_watchdog),
        software: on(map.software),
        power_on: on(map.power_on),
        pin: on(map.pin),
        brown_out: on(map.brown_out),
    }
}

/// [`Processor`] backend for Cortex-M3/M4 class STM32 parts.
#[derive(Debug)]
pub struct CortexProcessor {
    map: ResetCauseMap,
    region: StackRegion,
    ram_start: u32,
}

impl CortexProcessor {
    /// Backend over explicit stack bounds.
    ///
    /// `region.guard_base` must be aligned to `GUARD_BYTES`; the MPU
    /// rejects unaligned region bases.
    pub const fn new(map: ResetCauseMap, region: StackRegion, ram_start: u32) -> Self {
        Self {
            map,
            region,
            ram_start,
        }
    }

    /// Backend with stack bounds taken from the linker script.
    ///
    /// Requires `_stack_start` (provided by `cortex-m-rt`) and a
    /// `_stack_guard` symbol placed by the application's memory layout at
    /// the lowest `GUARD_BYTES` of the stack.
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    pub fn from_linker(map: ResetCauseMap, ram_start: u32) -> Self {
        extern "C" {
            static _stack_start: u32;
            static _stack_guard: u32;
        }
        let region = StackRegion {
            top: unsafe { core::ptr::addr_of!(_stack_start) } as u32,
            guard_base: unsafe { core::ptr::addr_of!(_stack_guard) } as u32,
        };
        Self::new(map, region, ram_start)
    }
}

impl Processor for CortexProcessor {
    fn fault_registers(&self) -> FaultRegisters {
        let icsr = regs::read(ICSR);
        FaultRegisters {
            ipsr: icsr & ICSR_VECTACTIVE,
            icsr,
            shcsr: regs::read(SHCSR),
            cfsr: regs::read(CFSR),
            hfsr: regs::read(HFSR),
            mmfar: regs::read(MMFAR),
            bfar: regs::read(BFAR),
        }
    }

    fn read_reset_cause(&mut self) -> ResetCause {
        let raw = regs::read(self.map.csr);
        regs::modify(self.map.csr, |v| v | self.map.clear);
        decode_reset_cause(raw, &self.map)
    }

    fn stack_region(&self) -> StackRegion {
        self.region
    }

    fn ram_start(&self) -> u32 {
        self.ram_start
    }

    fn current_sp(&self) -> u32 {
        cortex_m::register::msp::read()
    }

    fn current_lr(&self) -> u32 {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        {
            let lr: u32;
            unsafe {
                core::arch::asm!("mov {}, lr", out(reg) lr, options(nomem, nostack, preserves_flags));
            }
            lr
        }
        #[cfg(not(all(target_arch = "arm", target_os = "none")))]
        {
            // Meaningless off target; the mock backend is used there.
            0
        }
    }

    fn read_frame(&self, sp: u32) -> ExceptionFrame {
        ExceptionFrame {
            r0: regs::read(sp),
            r1: regs::read(sp + 4),
            r2: regs::read(sp + 8),
            r3: regs::read(sp + 12),
            r12: regs::read(sp + 16),
            lr: regs::read(sp + 20),
            return_addr: regs::read(sp + 24),
            xpsr: regs::read(sp + 28),
        }
    }

    fn paint_stack(&mut self, pattern: u32) {
        let ceiling = self.current_sp().saturating_sub(PAINT_MARGIN);
        let mut addr = self.region.guard_end();
        while addr + 4 <= ceiling {
            regs::write(addr, pattern);
            addr += 4;
        }
    }

    fn stack_watermark(&self, pattern: u32) -> u32 {
        let mut addr = self.region.guard_end();
        while addr + 4 <= self.region.top {
            if regs::read(addr) != pattern {
                return addr;
            }
            addr += 4;
        }
        self.region.top
    }

    fn guard_enable(&mut self) {
        regs::write(MPU_RBAR, self.region.guard_base | RBAR_VALID | GUARD_REGION);
        regs::write(MPU_RASR, guard_rasr());
        regs::modify(MPU_CTRL, |v| v | MPU_CTRL_ENABLE | MPU_CTRL_PRIVDEFENA);
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn guard_disable(&mut self) {
        regs::write(MPU_RNR, GUARD_REGION);
        regs::write(MPU_RASR, 0);
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn system_reset(&mut self) -> ! {
        cortex_m::peripheral::SCB::sys_reset()
    }

    fn provoke_stack_overflow(&mut self) -> ! {
        fn descend(depth: u64) -> u64 {
            let mut frame = [depth; 16];
            core::hint::black_box(&mut frame);
            if frame[0] == u64::MAX {
                return 0;
            }
            frame[0] + descend(depth + 1)
        }
        descend(0);
        unreachable!()
    }

    fn provoke_invalid_access(&mut self) -> ! {
        regs::write(0xFFFF_FFFC, 0xDEAD_BEEF);
        // If the access somehow survives, hang until the watchdog fires.
        loop {
            cortex_m::asm::nop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_maps_family_bits_to_causes() {
        let raw = ResetCauseMap::F4.independent_watchdog | ResetCauseMap::F4.pin;
        let cause = decode_reset_cause(raw, &ResetCauseMap::F4);
        assert!(cause.independent_watchdog);
        assert!(cause.pin);
        assert!(!cause.software);
        assert_eq!(cause.raw, raw);
    }

    #[test]
    fn zero_mask_never_reports_a_cause() {
        // L4 has no separate power-on flag; all bits set must not claim one.
        let cause = decode_reset_cause(u32::MAX, &ResetCauseMap::L4);
        assert!(!cause.power_on);
        assert!(cause.brown_out);
    }

    #[test]
    fn guard_region_attributes_encode_the_guard_size() {
        assert_eq!(size_field(GUARD_BYTES), 4);
        assert_eq!(1u32 << (size_field(GUARD_BYTES) + 1), GUARD_BYTES);
        let rasr = guard_rasr();
        assert_eq!(rasr & RASR_ENABLE, RASR_ENABLE);
        assert_eq!(rasr & RASR_XN, RASR_XN);
        // AP field zero: no access from any privilege level.
        assert_eq!(rasr & (0b111 << 24), 0);
    }

    #[test]
    fn family_maps_point_at_distinct_registers() {
        assert_ne!(ResetCauseMap::L4.csr, ResetCauseMap::F4.csr);
        assert_ne!(ResetCauseMap::L4.csr, ResetCauseMap::U5.csr);
    }
}
