//! Persisted Crash Records and Region Walking
//!
//! ## Overview
//!
//! Three record types make up the diagnostic region, in this order:
//!
//! ```text
//! offset 0        [FaultSnapshot]   magic 0xDEAD0001, 96 bytes
//! offset 96       [trace image]     magic 0xF00D0001, header + ring bytes
//! offset 96+image [EndMarker]       magic 0xC0DA0001, 16 bytes
//! ```
//!
//! Every section starts with its own magic and total length, so a reader
//! can walk the region with no external knowledge of sizes, stopping at the
//! end marker or at anything it does not recognize. [`sections`] implements
//! that walk over any byte slice; the console dump, the tests and the host
//! decoder all share it.
//!
//! ## Layout Discipline
//!
//! Records are `#[repr(C)]`, all-`u32`, and padded so every size is a
//! multiple of both supported write granularities (8 and 16 bytes). The
//! asserts below are load-bearing: a field added without adjusting padding
//! breaks the persisted format and the flash driver's alignment rules at
//! the same time.

#![allow(unsafe_code)] // Required for the raw byte views persisted to flash

use static_assertions::{const_assert, const_assert_eq};

use crate::config::magic;

/// Size of the hardware-pushed exception frame, in bytes.
pub const FRAME_BYTES: u32 = 32;

/// Registers pushed by the hardware on exception entry, in push order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct ExceptionFrame {
    /// Argument/scratch register r0.
    pub r0: u32,
    /// Argument/scratch register r1.
    pub r1: u32,
    /// Argument/scratch register r2.
    pub r2: u32,
    /// Argument/scratch register r3.
    pub r3: u32,
    /// Intra-procedure scratch register.
    pub r12: u32,
    /// Link register at the moment of the exception.
    pub lr: u32,
    /// Address of the interrupted instruction.
    pub return_addr: u32,
    /// Program status register.
    pub xpsr: u32,
}

const_assert_eq!(core::mem::size_of::<ExceptionFrame>(), FRAME_BYTES as usize);

/// Known fault classes recorded in [`FaultSnapshot::kind`].
///
/// The field itself stays a raw `u32`: operator test commands may inject
/// arbitrary values and the decoder must render whatever was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum FaultKind {
    /// Unhandled CPU exception.
    Exception = 1,
    /// Software watchdog declared a client stalled.
    Watchdog = 2,
    /// Explicit software-detected fault report.
    Software = 3,
}

impl FaultKind {
    /// Decode a stored kind value.
    pub const fn from_u32(v: u32) -> Option<FaultKind> {
        match v {
            1 => Some(FaultKind::Exception),
            2 => Some(FaultKind::Watchdog),
            3 => Some(FaultKind::Software),
            _ => None,
        }
    }

    /// Raw value stored in the snapshot.
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Human-readable name for status output and the decoder.
    pub const fn name(self) -> &'static str {
        match self {
            FaultKind::Exception => "exception",
            FaultKind::Watchdog => "watchdog",
            FaultKind::Software => "software",
        }
    }
}

/// Fixed-size snapshot of the processor at the moment of a fault.
///
/// Materialized only on the panic path and written once at offset 0 of the
/// diagnostic region. All registers are stored raw; interpretation happens
/// on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct FaultSnapshot {
    /// Section magic, [`magic::FAULT`].
    pub magic: u32,
    /// Total section length in bytes (96).
    pub len: u32,
    /// Fault class, usually one of [`FaultKind`].
    pub kind: u32,
    /// Free-form parameter supplied by the reporting site.
    pub param: u32,
    /// Hardware exception frame, zero-filled if it could not be captured.
    pub frame: ExceptionFrame,
    /// Stack pointer at capture.
    pub sp: u32,
    /// Link register at capture.
    pub lr: u32,
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
    /// Uptime in milliseconds at capture.
    pub uptime_ms: u32,
    _pad: [u32; 2],
}

impl FaultSnapshot {
    /// Section size in bytes.
    pub const BYTES: usize = 96;

    /// Fresh snapshot with magic and length set, everything else zero.
    pub const fn new(kind: u32, param: u32) -> Self {
        Self {
            magic: magic::FAULT,
            len: Self::BYTES as u32,
            kind,
            param,
            frame: ExceptionFrame {
                r0: 0,
                r1: 0,
                r2: 0,
                r3: 0,
                r12: 0,
                lr: 0,
                return_addr: 0,
                xpsr: 0,
            },
            sp: 0,
            lr: 0,
            ipsr: 0,
            icsr: 0,
            shcsr: 0,
            cfsr: 0,
            hfsr: 0,
            mmfar: 0,
            bfar: 0,
            uptime_ms: 0,
            _pad: [0; 2],
        }
    }

    /// The snapshot as the exact bytes that go to flash.
    pub fn as_bytes(&self) -> &[u8] {
        // repr(C), all u32, size asserted below: no padding surprises.
        unsafe {
            core::slice::from_raw_parts((self as *const FaultSnapshot).cast::<u8>(), Self::BYTES)
        }
    }

    /// Parse a snapshot from stored little-endian bytes.
    ///
    /// Returns `None` if `bytes` is too short or the magic does not match.
    pub fn read_from(bytes: &[u8]) -> Option<FaultSnapshot> {
        if bytes.len() < Self::BYTES {
            return None;
        }
        let w = |i: usize| {
            let o = i * 4;
            u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]])
        };
        if w(0) != magic::FAULT {
            return None;
        }
        let mut snap = FaultSnapshot::new(w(2), w(3));
        snap.len = w(1);
        snap.frame = ExceptionFrame {
            r0: w(4),
            r1: w(5),
            r2: w(6),
            r3: w(7),
            r12: w(8),
            lr: w(9),
            return_addr: w(10),
            xpsr: w(11),
        };
        snap.sp = w(12);
        snap.lr = w(13);
        snap.ipsr = w(14);
        snap.icsr = w(15);
        snap.shcsr = w(16);
        snap.cfsr = w(17);
        snap.hfsr = w(18);
        snap.mmfar = w(19);
        snap.bfar = w(20);
        snap.uptime_ms = w(21);
        Some(snap)
    }
}

/// Terminates the diagnostic region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct EndMarker {
    /// Section magic, [`magic::END`].
    pub magic: u32,
    /// Total section length in bytes (16).
    pub len: u32,
    _pad: [u32; 2],
}

impl EndMarker {
    /// Section size in bytes.
    pub const BYTES: usize = 16;

    /// A well-formed end marker.
    pub const fn new() -> Self {
        Self {
            magic: magic::END,
            len: Self::BYTES as u32,
            _pad: [0; 2],
        }
    }

    /// The marker as the exact bytes that go to flash.
    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts((self as *const EndMarker).cast::<u8>(), Self::BYTES)
        }
    }
}

impl Default for EndMarker {
    fn default() -> Self {
        Self::new()
    }
}

// Both records must program cleanly at 8- and 16-byte granularity.
const_assert_eq!(core::mem::size_of::<FaultSnapshot>(), FaultSnapshot::BYTES);
const_assert_eq!(core::mem::size_of::<EndMarker>(), EndMarker::BYTES);
const_assert!(FaultSnapshot::BYTES % 16 == 0);
const_assert!(FaultSnapshot::BYTES % 8 == 0);
const_assert!(EndMarker::BYTES % 16 == 0);
const_assert!(EndMarker::BYTES % 8 == 0);

/// Classified section magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SectionKind {
    /// Fault snapshot section.
    Fault,
    /// Trace buffer image section.
    Trace,
    /// End marker.
    End,
}

impl SectionKind {
    /// Classify a magic word; `None` for anything unrecognized.
    pub const fn from_magic(m: u32) -> Option<SectionKind> {
        match m {
            magic::FAULT => Some(SectionKind::Fault),
            magic::TRACE => Some(SectionKind::Trace),
            magic::END => Some(SectionKind::End),
            _ => None,
        }
    }
}

/// One self-describing section of the diagnostic region.
#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    /// Classified magic.
    pub kind: SectionKind,
    /// Byte offset of the section within the region.
    pub offset: usize,
    /// Declared section length in bytes.
    pub len: u32,
    /// The full section, header included.
    pub bytes: &'a [u8],
}

/// Walk a diagnostic region by magic + length.
///
/// Iteration stops after the end marker, at an unrecognized magic, or at a
/// declared length that cannot fit the remaining bytes. A region that never
/// held a snapshot yields nothing.
pub fn sections(region: &[u8]) -> SectionIter<'_> {
    SectionIter {
        region,
        offset: 0,
        done: false,
    }
}

/// Iterator over [`Section`]s, see [`sections`].
pub struct SectionIter<'a> {
    region: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> Iterator for SectionIter<'a> {
    type Item = Section<'a>;

    fn next(&mut self) -> Option<Section<'a>> {
        if self.done || self.offset + 8 > self.region.len() {
            self.done = true;
            return None;
        }
        let at = self.offset;
        let word = |o: usize| {
            u32::from_le_bytes([
                self.region[o],
                self.region[o + 1],
                self.region[o + 2],
                self.region[o + 3],
            ])
        };
        let kind = match SectionKind::from_magic(word(at)) {
            Some(k) => k,
            None => {
                self.done = true;
                return None;
            }
        };
        let len = word(at + 4);
        let end = at.checked_add(len as usize)?;
        if len < 8 || end > self.region.len() {
            self.done = true;
            return None;
        }
        self.offset = end;
        if kind == SectionKind::End {
            self.done = true;
        }
        Some(Section {
            kind,
            offset: at,
            len,
            bytes: &self.region[at..end],
        })
    }
}
