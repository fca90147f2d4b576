//! Reset-Surviving Boot State Cell
//!
//! [`BootState`] only works if it lives in RAM that startup code never
//! touches: the failure counter must survive a watchdog reset, and a cold
//! power-on must leave it as noise for the checksum to reject. The static
//! here sits in a `.uninit` section, which `cortex-m-rt` places but neither
//! zeroes nor copies an image over.
//!
//! The application's linker script needs the section in plain SRAM:
//!
//! ```text
//! SECTIONS {
//!     .uninit (NOLOAD) : ALIGN(4) { *(.uninit .uninit.*) } > RAM
//! }
//! ```
//!
//! (cortex-m-rt's default `link.x` already does this.)
//!
//! On host builds the section attribute is dropped and the cell behaves as
//! an ordinary initialized static.

#![allow(unsafe_code)]

use core::cell::UnsafeCell;

use crashguard_core::wdg::boot::BootState;

struct BootCell(UnsafeCell<BootState>);

// Access is confined to the two single-threaded windows documented on
// `boot_state`.
unsafe impl Sync for BootCell {}

#[cfg_attr(
    all(target_arch = "arm", target_os = "none"),
    link_section = ".uninit.CRASHGUARD_BOOT_STATE"
)]
static BOOT_STATE: BootCell = BootCell(UnsafeCell::new(BootState::new()));

/// The boot state carried across resets.
///
/// The content is whatever the last boot left behind, or power-on noise;
/// callers must run [`BootState::validate`] before trusting it.
///
/// # Safety
///
/// The returned reference aliases a single global. Call only before the
/// scheduler and interrupts are live (bring-up) or with them dead (the
/// panic path), and never hold two references at once.
pub unsafe fn boot_state() -> &'static mut BootState {
    &mut *BOOT_STATE.0.get()
}
