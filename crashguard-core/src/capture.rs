//! Crash Capture and Persistence
//!
//! ## Overview
//!
//! When the system is going down, this module turns the last CPU state into
//! a diagnostic region in non-volatile memory and forces a clean reset. The
//! path is deliberately linear and allocation-free:
//!
//! ```text
//! fault ──► guard off ──► feed hw watchdog ──► capture frame + registers
//!       ──► persist snapshot + trace + end marker ──► console dump ──► reset
//! ```
//!
//! The guard comes off first so that walking a damaged stack cannot re-fault
//! into the guard region, and the hardware watchdog is fed once so the flash
//! erase (tens of milliseconds) cannot be cut short by a hardware reset.
//!
//! ## First Failure Wins
//!
//! [`persist`] reads the first word of the region before touching it. If a
//! fault snapshot magic is already there, the new record is dropped and the
//! old one preserved: the earliest crash after deployment is almost always
//! the one worth reading, and later crashes are often just consequences.
//! Only the magic is checked, so a region holding a snapshot with a torn
//! tail still counts as occupied.
//!
//! ## Boot-Time Setup
//!
//! [`CaptureController::start`] runs once at boot: it latches the reset
//! cause, paints the unused stack with a fill pattern for later high-water
//! measurement, and arms the stack guard.

use core::fmt;

use crate::config::{magic, stack};
use crate::errors::Result;
use crate::nvm::device::NvmDevice;
use crate::nvm::NvmDriver;
use crate::processor::{
    frame_capture_allowed, FaultRegisters, Processor, ResetCause, StackRegion,
};
use crate::record::{EndMarker, ExceptionFrame, FaultKind, FaultSnapshot};
use crate::trace;
use crate::wdg::HardwareWatchdog;

macro_rules! log_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::warn!($($arg)*);
        #[cfg(all(feature = "defmt", not(feature = "log")))]
        defmt::warn!($($arg)*);
    };
}

/// Where and how crash records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Page-aligned base address of the diagnostic flash region.
    pub region_addr: u32,
    /// Write the record to flash on a fault.
    pub persist: bool,
    /// Dump the record to the console on a fault.
    pub console_dump: bool,
}

impl CaptureConfig {
    /// Persist and dump, with the region at `region_addr`.
    pub const fn new(region_addr: u32) -> Self {
        Self {
            region_addr,
            persist: true,
            console_dump: true,
        }
    }
}

/// Stack occupancy as measured against the boot-time fill pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackStatus {
    /// Stack bounds.
    pub region: StackRegion,
    /// Lowest address the stack has ever reached since the paint.
    pub watermark: u32,
    /// Stack pointer at the time of the query.
    pub current_sp: u32,
}

impl StackStatus {
    /// Peak bytes ever in use.
    pub const fn peak_used(&self) -> u32 {
        self.region.top - self.watermark
    }

    /// Bytes in use right now.
    pub const fn current_used(&self) -> u32 {
        self.region.top - self.current_sp
    }

    /// Usable stack bytes between guard and top.
    pub const fn usable(&self) -> u32 {
        self.region.usable_bytes()
    }
}

/// Owns the processor seam and the boot-time crash-capture setup.
pub struct CaptureController<P: Processor> {
    processor: P,
    config: CaptureConfig,
    reset_cause: Option<ResetCause>,
}

impl<P: Processor> CaptureController<P> {
    /// Wrap a processor backend. Nothing is touched until [`start`].
    ///
    /// [`start`]: CaptureController::start
    pub fn new(processor: P, config: CaptureConfig) -> Self {
        Self {
            processor,
            config,
            reset_cause: None,
        }
    }

    /// One-time boot setup: latch the reset cause, paint the free stack,
    /// arm the guard. Returns the latched cause.
    pub fn start(&mut self) -> ResetCause {
        let cause = self.processor.read_reset_cause();
        self.reset_cause = Some(cause);
        self.processor.paint_stack(stack::FILL_PATTERN);
        self.processor.guard_enable();
        cause
    }

    /// Reset cause latched by [`start`], empty before it ran.
    ///
    /// [`start`]: CaptureController::start
    pub fn reset_cause(&self) -> ResetCause {
        self.reset_cause.unwrap_or_default()
    }

    /// Measure stack occupancy against the boot-time paint.
    pub fn stack_status(&self) -> StackStatus {
        StackStatus {
            region: self.processor.stack_region(),
            watermark: self.processor.stack_watermark(stack::FILL_PATTERN),
            current_sp: self.processor.current_sp(),
        }
    }

    /// Capture configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// The wrapped processor backend.
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Mutable access to the processor backend.
    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }
}

/// Read the exception frame at `sp` if the pointer passes the sanity check,
/// a zero-filled frame otherwise.
///
/// A fault that corrupted the stack pointer must still produce a record;
/// the zero frame tells the analyst exactly that.
pub fn frame_from_stack(processor: &dyn Processor, sp: u32) -> ExceptionFrame {
    let region = processor.stack_region();
    if frame_capture_allowed(sp, processor.ram_start(), region.top) {
        processor.read_frame(sp)
    } else {
        ExceptionFrame::default()
    }
}

/// Assemble a snapshot from captured state.
///
/// `uptime_ms` is stored truncated to 32 bits, matching the persisted
/// field.
pub fn build_snapshot(
    kind: FaultKind,
    param: u32,
    frame: ExceptionFrame,
    sp: u32,
    lr: u32,
    regs: &FaultRegisters,
    uptime_ms: u64,
) -> FaultSnapshot {
    let mut snap = FaultSnapshot::new(kind.as_u32(), param);
    snap.frame = frame;
    snap.sp = sp;
    snap.lr = lr;
    snap.ipsr = regs.ipsr;
    snap.icsr = regs.icsr;
    snap.shcsr = regs.shcsr;
    snap.cfsr = regs.cfsr;
    snap.hfsr = regs.hfsr;
    snap.mmfar = regs.mmfar;
    snap.bfar = regs.bfar;
    snap.uptime_ms = uptime_ms as u32;
    snap
}

/// What [`persist`] did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistOutcome {
    /// Region was free; the record is now stored.
    Written,
    /// Region already held a snapshot; it was left untouched.
    Preserved,
}

/// Write snapshot, trace image and end marker to the diagnostic region,
/// unless an earlier record is already there.
///
/// `region_addr` must be page-aligned and the region must span
/// `FaultSnapshot::BYTES + trace_image.len() + EndMarker::BYTES` bytes.
/// The image length must be a multiple of the write granularity, which
/// every `TraceBuffer` image is by construction.
pub fn persist<D: NvmDevice>(
    driver: &mut NvmDriver<D>,
    region_addr: u32,
    snapshot: &FaultSnapshot,
    trace_image: &[u8],
) -> Result<PersistOutcome> {
    let mut word = [0u8; 4];
    driver.read(region_addr, &mut word)?;
    if u32::from_le_bytes(word) == magic::FAULT {
        return Ok(PersistOutcome::Preserved);
    }

    let total = (FaultSnapshot::BYTES + trace_image.len() + EndMarker::BYTES) as u32;
    let page = driver.device().geometry().page_size;
    let mut at = region_addr;
    while at < region_addr + total {
        driver.erase_page(at)?;
        at += page;
    }

    driver.write(region_addr, snapshot.as_bytes())?;
    let trace_at = region_addr + FaultSnapshot::BYTES as u32;
    driver.write(trace_at, trace_image)?;
    let end = EndMarker::new();
    driver.write(trace_at + trace_image.len() as u32, end.as_bytes())?;
    Ok(PersistOutcome::Written)
}

/// Hex-dump `bytes` to `out`, 32 bytes per line, offsets starting at
/// `base`.
///
/// The format is fixed: `xxxxxxxx: ` then the bytes as bare hex pairs. The
/// host decoder parses exactly this shape back out of a console log.
pub fn dump_hex(out: &mut dyn fmt::Write, base: u32, bytes: &[u8]) -> fmt::Result {
    for (i, chunk) in bytes.chunks(32).enumerate() {
        write!(out, "{:08x}: ", base + (i as u32) * 32)?;
        for b in chunk {
            write!(out, "{:02x}", b)?;
        }
        out.write_str("\n")?;
    }
    Ok(())
}

/// Process a fatal fault: capture, persist, dump, reset. Never returns.
///
/// `exception_sp` is the stack pointer the exception hardware saved, when
/// the caller is a fault handler; `None` falls back to the live pointer for
/// software-reported faults. Persistence and dump failures are logged and
/// otherwise ignored: nothing on this path is allowed to stop the reset.
///
/// Callers already run in a fault handler or have interrupts masked; this
/// function takes no lock of its own.
#[allow(clippy::too_many_arguments)]
pub fn process_fault<D: NvmDevice>(
    kind: FaultKind,
    param: u32,
    exception_sp: Option<u32>,
    processor: &mut dyn Processor,
    watchdog: &mut dyn HardwareWatchdog,
    driver: &mut NvmDriver<D>,
    config: &CaptureConfig,
    console: Option<&mut dyn fmt::Write>,
    uptime_ms: u64,
    trace_image: &[u8],
) -> ! {
    processor.guard_disable();
    watchdog.feed();

    let sp = exception_sp.unwrap_or_else(|| processor.current_sp());
    let frame = frame_from_stack(processor, sp);
    let regs = processor.fault_registers();
    let snapshot = build_snapshot(kind, param, frame, sp, processor.current_lr(), &regs, uptime_ms);

    if config.persist {
        match persist(driver, config.region_addr, &snapshot, trace_image) {
            Ok(PersistOutcome::Written) => {}
            Ok(PersistOutcome::Preserved) => {
                log_warn!("crash record kept from an earlier fault");
            }
            Err(e) => {
                log_warn!("crash record not persisted: {}", e);
            }
        }
    }

    if config.console_dump {
        if let Some(out) = console {
            let _ = writeln!(
                out,
                "fault kind={} param={:#x} sp={:#x}",
                snapshot.kind, snapshot.param, snapshot.sp
            );
            let _ = dump_hex(out, 0, snapshot.as_bytes());
            let _ = dump_hex(out, FaultSnapshot::BYTES as u32, trace_image);
            let end = EndMarker::new();
            let _ = dump_hex(
                out,
                (FaultSnapshot::BYTES + trace_image.len()) as u32,
                end.as_bytes(),
            );
        }
    }

    processor.system_reset()
}

/// [`process_fault`] using the global trace buffer's image.
///
/// Recording is stopped first so the persisted image cannot shift under the
/// write. The reset fires while the trace lock is held, which is harmless:
/// nothing runs after it.
#[allow(clippy::too_many_arguments)]
pub fn panic_with_global_trace<D: NvmDevice>(
    kind: FaultKind,
    param: u32,
    exception_sp: Option<u32>,
    processor: &mut dyn Processor,
    watchdog: &mut dyn HardwareWatchdog,
    driver: &mut NvmDriver<D>,
    config: &CaptureConfig,
    console: Option<&mut dyn fmt::Write>,
    uptime_ms: u64,
) -> ! {
    trace::set_enabled(false);
    trace::with_image(|image| {
        process_fault(
            kind,
            param,
            exception_sp,
            processor,
            watchdog,
            driver,
            config,
            console,
            uptime_ms,
            image,
        );
    });
    unreachable!()
}
