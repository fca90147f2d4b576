//! RAM-Backed Storage Device
//!
//! A [`NvmDevice`] over a plain byte array, with real flash semantics:
//! erase sets a page to `0xFF`, programming can only clear bits (the data
//! lands AND-ed with what is already there). That detail matters — the
//! persistence-skip logic and the erase command are only honest to test
//! against a device that refuses to turn a 0 back into a 1.
//!
//! Fault injection covers the three failure classes the driver must map:
//! a busy device, a failed erase and a failed program. Counters expose how
//! often the device was actually touched, so tests can assert that invalid
//! arguments never reach it.

use super::device::{NvmDevice, NvmGeometry, PageAddress};

/// Error flag raised by an injected erase failure.
pub const ERR_ERASE: u32 = 1 << 0;
/// Error flag raised by an injected program failure.
pub const ERR_PROGRAM: u32 = 1 << 1;

/// In-memory storage device for host tests and demos.
///
/// `BYTES` must equal the configured geometry's total size.
pub struct MemNvm<const BYTES: usize> {
    geometry: NvmGeometry,
    mem: [u8; BYTES],
    busy: bool,
    fail_erase: bool,
    fail_program: bool,
    error_bits: u32,
    erases: u32,
    programs: u32,
    touches: u32,
}

impl<const BYTES: usize> MemNvm<BYTES> {
    /// Fresh device, fully erased.
    ///
    /// Panics if `geometry` does not describe exactly `BYTES` bytes; that is
    /// a bug in the test, not a runtime condition.
    pub fn new(geometry: NvmGeometry) -> Self {
        assert_eq!(geometry.size() as usize, BYTES);
        Self {
            geometry,
            mem: [0xFF; BYTES],
            busy: false,
            fail_erase: false,
            fail_program: false,
            error_bits: 0,
            erases: 0,
            programs: 0,
            touches: 0,
        }
    }

    /// Simulate an operation left in flight.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Make every erase raise [`ERR_ERASE`] without touching memory.
    pub fn set_fail_erase(&mut self, fail: bool) {
        self.fail_erase = fail;
    }

    /// Make every program raise [`ERR_PROGRAM`] without touching memory.
    pub fn set_fail_program(&mut self, fail: bool) {
        self.fail_program = fail;
    }

    /// The device's entire contents.
    pub fn contents(&self) -> &[u8] {
        &self.mem
    }

    /// Number of erase commands issued.
    pub fn erases(&self) -> u32 {
        self.erases
    }

    /// Number of program units issued.
    pub fn programs(&self) -> u32 {
        self.programs
    }

    /// Total state-changing device interactions (unlock, begin, erase,
    /// program, end). Zero means the driver rejected the call untouched.
    pub fn touches(&self) -> u32 {
        self.touches
    }

    fn offset_of(&self, addr: u32) -> usize {
        (addr - self.geometry.base) as usize
    }
}

impl<const BYTES: usize> NvmDevice for MemNvm<BYTES> {
    fn geometry(&self) -> NvmGeometry {
        self.geometry
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    fn unlock(&mut self) {
        self.touches += 1;
    }

    fn begin_op(&mut self) {
        self.touches += 1;
        self.error_bits = 0;
    }

    fn start_erase(&mut self, target: PageAddress) {
        self.touches += 1;
        self.erases += 1;
        if self.fail_erase {
            self.error_bits |= ERR_ERASE;
            return;
        }
        let page = target.bank * self.geometry.pages_per_bank() + target.page;
        let start = (page * self.geometry.page_size) as usize;
        let end = start + self.geometry.page_size as usize;
        for b in &mut self.mem[start..end] {
            *b = 0xFF;
        }
    }

    fn program_unit(&mut self, addr: u32, chunk: &[u8]) {
        self.touches += 1;
        self.programs += 1;
        if self.fail_program {
            self.error_bits |= ERR_PROGRAM;
            return;
        }
        let start = self.offset_of(addr);
        for (i, &b) in chunk.iter().enumerate() {
            // Programming can only clear bits.
            self.mem[start + i] &= b;
        }
    }

    fn end_op(&mut self) -> u32 {
        self.touches += 1;
        core::mem::take(&mut self.error_bits)
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        let start = self.offset_of(addr);
        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
    }
}
