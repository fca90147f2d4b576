//! Storage Device Capability Interface
//!
//! The driver in [`crate::nvm`] owns validation, sequencing and chunking;
//! everything a concrete device family does differently — register layout,
//! unlock keys, bank/page encoding, cache handling — sits behind
//! [`NvmDevice`]. Implementations do register pokes and nothing else: no
//! waiting, no policy, no argument checking.
//!
//! The erase/program sequence the driver drives is always:
//!
//! ```text
//! is_busy?            reject concurrent use
//! unlock              write-protection handshake
//! begin_op            clear stale errors + command bits, suspend caches
//! start_erase /       issue the command
//!   program_unit
//! poll_idle           busy-wait, bounded by hardware completion
//! end_op              collect + clear error flags, restore caches
//! ```

/// Erase-grid and programming geometry of a storage device.
///
/// `page_size`/`pages` describe a uniform erase grid; devices with irregular
/// sectors report their total span here and override
/// [`NvmDevice::erase_target`] with their own lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NvmGeometry {
    /// First mapped address of the device.
    pub base: u32,
    /// Bytes per erase page.
    pub page_size: u32,
    /// Total number of pages across all banks.
    pub pages: u32,
    /// Number of banks the pages split into evenly.
    pub banks: u32,
    /// Minimum program granularity in bytes (8 or 16 on supported parts).
    pub write_bytes: u32,
}

/// Bank-relative erase coordinates resolved from an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageAddress {
    /// Page index within its bank.
    pub page: u32,
    /// Bank index.
    pub bank: u32,
}

impl NvmGeometry {
    /// Total device size in bytes.
    pub const fn size(&self) -> u32 {
        self.page_size * self.pages
    }

    /// One past the last mapped address.
    pub const fn end(&self) -> u32 {
        self.base + self.size()
    }

    /// Whether `[addr, addr + len)` lies entirely on the device.
    pub const fn contains(&self, addr: u32, len: u32) -> bool {
        addr >= self.base && (addr - self.base) as u64 + len as u64 <= self.size() as u64
    }

    /// Pages per bank for a uniform grid.
    pub const fn pages_per_bank(&self) -> u32 {
        self.pages / self.banks
    }

    /// Resolve a page-aligned address to erase coordinates.
    ///
    /// `None` if `addr` is not page-aligned or outside the device.
    pub const fn erase_target(&self, addr: u32) -> Option<PageAddress> {
        if addr < self.base {
            return None;
        }
        let offset = addr - self.base;
        if offset % self.page_size != 0 {
            return None;
        }
        let page = offset / self.page_size;
        if page >= self.pages {
            return None;
        }
        let per_bank = self.pages_per_bank();
        Some(PageAddress {
            page: page % per_bank,
            bank: page / per_bank,
        })
    }
}

/// Register-level storage device operations.
///
/// Implementations must be panic-safe: callable with interrupts masked, no
/// allocation, no blocking beyond the hardware's own completion flags.
pub trait NvmDevice {
    /// Device geometry.
    fn geometry(&self) -> NvmGeometry;

    /// Resolve an erase address; the default suits uniform erase grids.
    fn erase_target(&self, addr: u32) -> Option<PageAddress> {
        self.geometry().erase_target(addr)
    }

    /// Whether an operation is still in flight.
    fn is_busy(&self) -> bool;

    /// Non-blocking completion poll, for use with `nb::block!`.
    fn poll_idle(&self) -> nb::Result<(), core::convert::Infallible> {
        if self.is_busy() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// Perform the write-protection unlock handshake.
    fn unlock(&mut self);

    /// Clear stale error flags and command bits; suspend caches if the
    /// device requires it during erase/program.
    fn begin_op(&mut self);

    /// Issue a page erase. The address was validated by the driver.
    fn start_erase(&mut self, target: PageAddress);

    /// Program one write-granularity unit at `addr`.
    ///
    /// `chunk.len()` equals [`NvmGeometry::write_bytes`]; the driver has
    /// already validated alignment and range.
    fn program_unit(&mut self, addr: u32, chunk: &[u8]);

    /// Collect and clear accumulated error flags, clear command bits and
    /// restore caches. Returns the raw device error bits, `0` when clean.
    fn end_op(&mut self) -> u32;

    /// Memory-mapped read of `buf.len()` bytes at `addr`.
    fn read(&self, addr: u32, buf: &mut [u8]);
}
