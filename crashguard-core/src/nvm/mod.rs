//! Panic-Safe Non-Volatile Storage Driver
//!
//! ## Overview
//!
//! Blocking erase/program/read for the reserved diagnostic region. The
//! driver is deliberately primitive: synchronous busy-waits bounded by the
//! hardware's completion flag, no queueing, no retries. It runs in exactly
//! two situations — the panic path, where a hang is acceptable because the
//! hardware watchdog is the backstop, and operator console commands, where
//! blocking is acceptable because a human asked.
//!
//! Device-family differences live behind [`NvmDevice`]; the driver
//! contributes what is common to all of them:
//!
//! - argument validation (`InvalidArg` before the device is touched at all)
//! - the unlock → begin → command → poll → collect-errors sequence
//! - chunking writes into the device's program granularity
//! - mapping accumulated device error flags to [`Error::Peripheral`]
//!
//! ## Error Policy
//!
//! A device error after an operation is reported, never retried. Callers on
//! the panic path log the failure and continue — see the crate-level notes
//! on best-effort persistence.

pub mod device;
pub mod memory;

pub use device::{NvmDevice, NvmGeometry, PageAddress};
pub use memory::MemNvm;

use crate::errors::{Error, Result};

#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{}};
}

/// Validating, sequencing driver over an [`NvmDevice`].
pub struct NvmDriver<D: NvmDevice> {
    device: D,
}

impl<D: NvmDevice> NvmDriver<D> {
    /// Wrap a device.
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// Shared access to the device, for geometry queries and test asserts.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Exclusive access to the device, for test fault injection.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Erase the page containing `addr`.
    ///
    /// `addr` must be page-aligned and on the device (`InvalidArg`
    /// otherwise, device untouched). `Busy` if an operation is already in
    /// flight. `Peripheral` if the device reports any error flag afterward.
    pub fn erase_page(&mut self, addr: u32) -> Result<()> {
        let target = self.device.erase_target(addr).ok_or(Error::InvalidArg)?;
        if self.device.is_busy() {
            return Err(Error::Busy);
        }
        self.device.unlock();
        self.device.begin_op();
        self.device.start_erase(target);
        self.wait_idle();
        let errors = self.device.end_op();
        if errors != 0 {
            log_warn!("nvm: erase at {:#010x} failed, flags {:#x}", addr, errors);
            return Err(Error::Peripheral);
        }
        Ok(())
    }

    /// Program `data` starting at `addr`.
    ///
    /// `addr` and `data.len()` must be multiples of the device's write
    /// granularity and the whole range must be on the device (`InvalidArg`
    /// otherwise, device untouched). Programs one granularity unit at a
    /// time, busy-polling each; error flags accumulate across all chunks
    /// and surface as one `Peripheral` at the end.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let geometry = self.device.geometry();
        let unit = geometry.write_bytes;
        if addr % unit != 0 || data.len() % unit as usize != 0 {
            return Err(Error::InvalidArg);
        }
        if !geometry.contains(addr, data.len() as u32) {
            return Err(Error::InvalidArg);
        }
        if self.device.is_busy() {
            return Err(Error::Busy);
        }
        self.device.unlock();
        self.device.begin_op();
        for (i, chunk) in data.chunks_exact(unit as usize).enumerate() {
            self.device.program_unit(addr + i as u32 * unit, chunk);
            self.wait_idle();
        }
        let errors = self.device.end_op();
        if errors != 0 {
            log_warn!(
                "nvm: write of {} bytes at {:#010x} failed, flags {:#x}",
                data.len(),
                addr,
                errors
            );
            return Err(Error::Peripheral);
        }
        Ok(())
    }

    /// Read `buf.len()` bytes at `addr`.
    ///
    /// Reads have no alignment requirement; only the range is checked.
    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        if !self.device.geometry().contains(addr, buf.len() as u32) {
            return Err(Error::InvalidArg);
        }
        self.device.read(addr, buf);
        Ok(())
    }

    fn wait_idle(&self) {
        // Bounded by hardware completion; the poll itself cannot fail.
        let _ = nb::block!(self.device.poll_idle());
    }
}
