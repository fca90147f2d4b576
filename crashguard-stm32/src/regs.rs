//! Raw memory-mapped register access.
//!
//! All peripheral addresses in this crate are compile-time constants, so the
//! accessors take plain `u32` addresses instead of going through a PAC. Every
//! access is volatile; the hardware can change these words between reads.

#![allow(unsafe_code)]

/// Reads a 32-bit peripheral register.
#[inline(always)]
pub(crate) fn read(addr: u32) -> u32 {
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

/// Writes a 32-bit peripheral register.
#[inline(always)]
pub(crate) fn write(addr: u32, value: u32) {
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}

/// Read-modify-write on a 32-bit peripheral register.
#[inline(always)]
pub(crate) fn modify(addr: u32, f: impl FnOnce(u32) -> u32) {
    write(addr, f(read(addr)));
}

/// Volatile byte-wise copy out of memory-mapped storage.
///
/// Flash contents change under program/erase commands, so plain loads are
/// not reliable here.
pub(crate) fn read_bytes(addr: u32, buf: &mut [u8]) {
    for (i, slot) in buf.iter_mut().enumerate() {
        *slot = unsafe { core::ptr::read_volatile((addr as usize + i) as *const u8) };
    }
}
