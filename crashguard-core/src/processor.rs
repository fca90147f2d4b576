//! Processor State Capture Seam
//!
//! ## Overview
//!
//! Everything the crash path needs from the CPU — fault status registers,
//! the pushed exception frame, stack bounds, the guard region, the reset
//! itself — funnels through the [`Processor`] trait. The core only ever
//! consumes plain structs of already-read values; register addresses, MPU
//! programming and the stack-pointer tricks live in a backend crate.
//!
//! That split keeps the dangerous part small and the logic testable:
//! [`frame_capture_allowed`] is the one decision that must never be wrong
//! (dereferencing a corrupted stack pointer during capture would turn a
//! diagnosable fault into a silent double fault), and here it is a pure
//! function with exhaustive tests.
//!
//! ## Stack Layout
//!
//! ```text
//! stack top (initial sp) ──► ┌──────────────┐  high addresses
//!                            │  live frames │
//!                 sp ──────► ├──────────────┤
//!                            │ fill pattern │  painted at start
//!        guard_end ────────► ├──────────────┤
//!                            │ guard region │  read-only, no-execute
//!        guard_base ───────► └──────────────┘  lowest legal stack address
//! ```
//!
//! The high-water scan walks upward from `guard_end` looking for the first
//! word that no longer holds the fill pattern.

use crate::config::stack::GUARD_BYTES;
use crate::record::{ExceptionFrame, FRAME_BYTES};

/// Fault and status registers captured at panic time.
///
/// Plain values, already read from the hardware by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultRegisters {
    /// Interrupt program status register.
    pub ipsr: u32,
    /// Interrupt control and state register.
    pub icsr: u32,
    /// System handler control and state register.
    pub shcsr: u32,
    /// Configurable fault status register.
    pub cfsr: u32,
    /// HardFault status register.
    pub hfsr: u32,
    /// MemManage fault address register.
    pub mmfar: u32,
    /// BusFault address register.
    pub bfar: u32,
}

/// Decoded cause of the most recent reset.
///
/// The backend reads the sticky hardware flags once at startup, clears
/// them, and hands the decoded result here. `raw` keeps the original bits
/// for the status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetCause {
    /// Raw reset-status register bits.
    pub raw: u32,
    /// Low-power management reset.
    pub low_power: bool,
    /// Window watchdog reset.
    pub window_watchdog: bool,
    /// Independent (hardware) watchdog reset.
    pub independent_watchdog: bool,
    /// Software-requested reset.
    pub software: bool,
    /// Power-on reset.
    pub power_on: bool,
    /// External reset pin.
    pub pin: bool,
    /// Brown-out reset.
    pub brown_out: bool,
}

impl core::fmt::Display for ResetCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut any = false;
        let mut put = |f: &mut core::fmt::Formatter<'_>, on: bool, name: &str| {
            if on {
                if any {
                    f.write_str(" ")?;
                }
                any = true;
                f.write_str(name)?;
            }
            Ok(())
        };
        put(f, self.low_power, "LPWR")?;
        put(f, self.window_watchdog, "WWDG")?;
        put(f, self.independent_watchdog, "IWDG")?;
        put(f, self.software, "SFT")?;
        put(f, self.power_on, "POR")?;
        put(f, self.pin, "PIN")?;
        put(f, self.brown_out, "BOR")?;
        if !any {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Stack bounds as laid out by the linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackRegion {
    /// Initial stack pointer (one past the highest stack byte).
    pub top: u32,
    /// Lowest legal stack address; the guard region starts here.
    pub guard_base: u32,
}

impl StackRegion {
    /// First address above the guard region.
    pub const fn guard_end(&self) -> u32 {
        self.guard_base + GUARD_BYTES
    }

    /// Usable stack bytes between guard and top.
    pub const fn usable_bytes(&self) -> u32 {
        self.top - self.guard_end()
    }
}

/// Whether a recorded stack pointer can be dereferenced to capture the
/// hardware exception frame.
///
/// The pointer must be 8-byte aligned (the hardware aligns frames), inside
/// the valid RAM range, and leave headroom for the full frame plus one
/// word. Anything else gets a zero-filled frame instead; by the time this
/// runs the stack pointer itself may be the thing that faulted.
pub fn frame_capture_allowed(sp: u32, ram_start: u32, stack_top: u32) -> bool {
    sp % 8 == 0 && sp >= ram_start && sp + FRAME_BYTES + 4 <= stack_top
}

/// Narrow interface to the CPU for crash capture and supervision.
///
/// Implementations do raw register access; all policy stays in the core.
pub trait Processor {
    /// Read the fault/status register set.
    fn fault_registers(&self) -> FaultRegisters;

    /// Read and clear the sticky reset-cause flags.
    ///
    /// The first call after a reset returns that reset's cause; later calls
    /// may return an empty cause. Callers latch the result.
    fn read_reset_cause(&mut self) -> ResetCause;

    /// Stack bounds for this target.
    fn stack_region(&self) -> StackRegion;

    /// Lowest valid RAM address, for the frame sanity check.
    fn ram_start(&self) -> u32;

    /// Current stack pointer.
    fn current_sp(&self) -> u32;

    /// Current link register.
    fn current_lr(&self) -> u32;

    /// Read the hardware-pushed exception frame at `sp`.
    ///
    /// Only called after [`frame_capture_allowed`] approved `sp`.
    fn read_frame(&self, sp: u32) -> ExceptionFrame;

    /// Fill the stack from the current pointer down to the guard with
    /// `pattern`, for later high-water measurement.
    fn paint_stack(&mut self, pattern: u32);

    /// Address of the first word above the guard that no longer holds
    /// `pattern`; the stack top if the paint is untouched.
    fn stack_watermark(&self, pattern: u32) -> u32;

    /// Arm the read-only, no-execute guard region at the lowest stack
    /// address.
    fn guard_enable(&mut self);

    /// Disarm the guard region. Done first on the panic path so capture
    /// itself cannot re-fault.
    fn guard_disable(&mut self);

    /// Force a full system reset. Never returns.
    fn system_reset(&mut self) -> !;

    /// Deliberately overflow the stack (operator test hook). Never returns.
    fn provoke_stack_overflow(&mut self) -> !;

    /// Deliberately perform an invalid memory access (operator test hook).
    /// Never returns.
    fn provoke_invalid_access(&mut self) -> !;
}

/// Simulated processor for host tests and demos.
///
/// Models the stack as a byte array covering `[guard_base, top)`, so the
/// paint/watermark logic runs against real memory contents. Register values
/// and the exception frame are canned and settable.
pub struct MockProcessor {
    regs: FaultRegisters,
    reset_cause: ResetCause,
    region: StackRegion,
    ram_start: u32,
    sp: u32,
    lr: u32,
    frame: ExceptionFrame,
    stack: [u8; Self::SPAN],
    guard_armed: bool,
    guard_disables: u32,
}

impl MockProcessor {
    /// Bytes of simulated stack, guard included.
    pub const SPAN: usize = 256;

    const GUARD_BASE: u32 = 0x2000_0100;

    /// Fresh mock: 256-byte stack at `0x2000_0100`, sp 64 bytes below the
    /// top, everything else zero.
    pub fn new() -> Self {
        let region = StackRegion {
            top: Self::GUARD_BASE + Self::SPAN as u32,
            guard_base: Self::GUARD_BASE,
        };
        Self {
            regs: FaultRegisters::default(),
            reset_cause: ResetCause::default(),
            region,
            ram_start: 0x2000_0000,
            sp: region.top - 64,
            lr: 0xFFFF_FFF9,
            frame: ExceptionFrame::default(),
            stack: [0; Self::SPAN],
            guard_armed: false,
            guard_disables: 0,
        }
    }

    /// Set the fault registers returned by [`Processor::fault_registers`].
    pub fn set_fault_registers(&mut self, regs: FaultRegisters) {
        self.regs = regs;
    }

    /// Set the cause returned by the next [`Processor::read_reset_cause`].
    pub fn set_reset_cause(&mut self, cause: ResetCause) {
        self.reset_cause = cause;
    }

    /// Set the simulated stack pointer.
    pub fn set_sp(&mut self, sp: u32) {
        self.sp = sp;
    }

    /// Set the frame returned by [`Processor::read_frame`].
    pub fn set_frame(&mut self, frame: ExceptionFrame) {
        self.frame = frame;
    }

    /// Overwrite one simulated stack word, as a deep call would.
    pub fn dirty_word(&mut self, addr: u32, value: u32) {
        let at = (addr - self.region.guard_base) as usize;
        self.stack[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Whether the guard region is currently armed.
    pub fn guard_armed(&self) -> bool {
        self.guard_armed
    }

    /// How many times the guard was disarmed.
    pub fn guard_disables(&self) -> u32 {
        self.guard_disables
    }

    fn word_at(&self, addr: u32) -> u32 {
        let at = (addr - self.region.guard_base) as usize;
        u32::from_le_bytes([
            self.stack[at],
            self.stack[at + 1],
            self.stack[at + 2],
            self.stack[at + 3],
        ])
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for MockProcessor {
    fn fault_registers(&self) -> FaultRegisters {
        self.regs
    }

    fn read_reset_cause(&mut self) -> ResetCause {
        core::mem::take(&mut self.reset_cause)
    }

    fn stack_region(&self) -> StackRegion {
        self.region
    }

    fn ram_start(&self) -> u32 {
        self.ram_start
    }

    fn current_sp(&self) -> u32 {
        self.sp
    }

    fn current_lr(&self) -> u32 {
        self.lr
    }

    fn read_frame(&self, _sp: u32) -> ExceptionFrame {
        self.frame
    }

    fn paint_stack(&mut self, pattern: u32) {
        let mut addr = self.region.guard_end();
        while addr + 4 <= self.sp {
            let at = (addr - self.region.guard_base) as usize;
            self.stack[at..at + 4].copy_from_slice(&pattern.to_le_bytes());
            addr += 4;
        }
    }

    fn stack_watermark(&self, pattern: u32) -> u32 {
        let mut addr = self.region.guard_end();
        while addr + 4 <= self.region.top {
            if self.word_at(addr) != pattern {
                return addr;
            }
            addr += 4;
        }
        self.region.top
    }

    fn guard_enable(&mut self) {
        self.guard_armed = true;
    }

    fn guard_disable(&mut self) {
        self.guard_armed = false;
        self.guard_disables += 1;
    }

    fn system_reset(&mut self) -> ! {
        panic!("system reset requested");
    }

    fn provoke_stack_overflow(&mut self) -> ! {
        panic!("stack overflow provoked");
    }

    fn provoke_invalid_access(&mut self) -> ! {
        panic!("invalid access provoked");
    }
}
