//! STM32 backends for the CrashGuard hardware seams
//!
//! Implements the traits `crashguard-core` leaves abstract, straight
//! against the register maps: flash program/erase devices for the L4, F4
//! and U5 families, the independent watchdog, and a Cortex-M processor
//! backend (fault registers, MPU stack guard, stack paint, reset cause,
//! system reset). A no-init RAM cell carries the persistent boot state
//! across warm resets.
//!
//! Peripheral addresses are compile-time constants poked through volatile
//! accessors, so there is no PAC dependency to pin the crate to one chip.
//! Everything that is plain arithmetic (timeout math, reset-cause decode,
//! sector tables, geometry) compiles and tests on the host; only the
//! register-touching paths need `target_arch = "arm"`/`target_os = "none"`
//! under them.
//!
//! ```no_run
//! use crashguard_stm32::{CortexProcessor, Iwdg, L4Flash, ResetCauseMap};
//! use crashguard_core::nvm::NvmDriver;
//! use crashguard_core::processor::StackRegion;
//!
//! let mut driver = NvmDriver::new(L4Flash::stm32l476());
//! let region = StackRegion {
//!     top: 0x2001_8000,
//!     guard_base: 0x2001_4000,
//! };
//! let processor = CortexProcessor::new(ResetCauseMap::L4, region, 0x2000_0000);
//! let watchdog = Iwdg::new();
//! # let _ = (driver.device(), processor, watchdog);
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod boot_cell;
pub mod cortex;
pub mod flash;
pub mod iwdg;
mod regs;

pub use boot_cell::boot_state;
pub use cortex::{decode_reset_cause, CortexProcessor, ResetCauseMap};
pub use flash::{F4Flash, L4Flash, U5Flash};
pub use iwdg::{timeout_to_reload, Iwdg};
