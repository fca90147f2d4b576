//! Low-Overhead Circular Event Trace
//!
//! ## Overview
//!
//! A byte-oriented circular log for discrete events, cheap enough to leave
//! enabled in production and safe to call from interrupt context. Each entry
//! is an event id followed by zero or more argument bytes:
//!
//! ```text
//! buf: ... | id | a0 | a1 | id | id | a0 | a1 | a2 | a3 | ...
//!                               ^cursor (next write)
//! ```
//!
//! The argument count is fixed per event id *at the call site* and is not
//! stored inline; only the offline decoder's id table knows how to find
//! entry boundaries. That asymmetry is the whole point: recording costs a
//! few byte stores, and all interpretation cost is paid on the host.
//!
//! ## Write Ordering
//!
//! [`TraceBuffer::record`] advances the cursor by `1 + args.len()` modulo
//! capacity *before* storing the id and argument bytes. A reader that
//! observes the buffer mid-record (including a crash captured at exactly the
//! wrong moment) may therefore see the cursor ahead of fully-written bytes.
//! This is a known, accepted window; the decoder treats a garbled final
//! entry as a truncated tail, not corruption.
//!
//! ## Persistence
//!
//! The header + buffer live in one `#[repr(C)]` block so the in-memory
//! image is exactly what gets persisted next to a fault snapshot. Header
//! fields (magic, total length, capacity) are refreshed when the image view
//! is taken; the cursor field is always live.
//!
//! ## Global Instance
//!
//! The free functions ([`record`], [`set_enabled`], [`with_image`], ...)
//! operate on one global buffer guarded by a `critical_section::Mutex`. The
//! enabled flag is mirrored in an atomic that is checked *before* entering
//! the critical section, so a disabled trace costs one relaxed load.

#![allow(unsafe_code)] // Required for the raw byte view persisted to flash

use core::cell::RefCell;

use critical_section::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use static_assertions::const_assert_eq;

use crate::config::{self, magic};

/// Bytes occupied by the image header (magic, length, capacity, cursor).
pub const HEADER_BYTES: usize = 16;

/// Persisted portion of the trace: header followed by the raw byte ring.
#[repr(C)]
struct TraceImage<const N: usize> {
    magic: u32,
    len: u32,
    capacity: u32,
    cursor: u32,
    buf: [u8; N],
}

// Header layout is part of the persisted format.
const_assert_eq!(core::mem::size_of::<TraceImage<0>>(), HEADER_BYTES);
const_assert_eq!(
    core::mem::size_of::<TraceImage<{ config::trace::DEFAULT_CAPACITY }>>(),
    HEADER_BYTES + config::trace::DEFAULT_CAPACITY
);

/// Circular event log with a persistable image.
///
/// `N` is the byte capacity of the ring and must be a nonzero multiple of 16
/// so the whole image stays programmable at every supported write
/// granularity.
pub struct TraceBuffer<const N: usize> {
    image: TraceImage<N>,
    enabled: bool,
    off_count: u32,
}

impl<const N: usize> TraceBuffer<N> {
    /// Total bytes of the persistable image.
    pub const IMAGE_BYTES: usize = HEADER_BYTES + N;

    /// Create an empty buffer with recording enabled.
    pub const fn new() -> Self {
        assert!(N != 0 && N % 16 == 0, "capacity must be a nonzero multiple of 16");
        assert!(core::mem::size_of::<TraceImage<N>>() == HEADER_BYTES + N);
        Self {
            image: TraceImage {
                magic: 0,
                len: 0,
                capacity: N as u32,
                cursor: 0,
                buf: [0; N],
            },
            enabled: true,
            off_count: 0,
        }
    }

    /// Record one event: the id byte followed by `args`, wrapping modulo
    /// capacity.
    ///
    /// The cursor moves past the whole entry before any byte is stored (see
    /// module docs). No-op while disabled. Decrements a pending auto-disable
    /// countdown; the record that reaches zero is still written.
    pub fn record(&mut self, id: u8, args: &[u8]) {
        if !self.enabled {
            return;
        }
        debug_assert!(args.len() < N);
        if self.off_count > 0 {
            self.off_count -= 1;
            if self.off_count == 0 {
                self.enabled = false;
            }
        }

        let at = (self.image.cursor % N as u32) as usize;
        self.image.cursor = (at as u32 + 1 + args.len() as u32) % N as u32;

        self.image.buf[at] = id;
        let mut idx = at + 1;
        for &b in args {
            self.image.buf[idx % N] = b;
            idx += 1;
        }
    }

    /// Toggle recording. Buffer contents are unaffected.
    pub fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
        if on {
            self.off_count = 0;
        }
    }

    /// Whether recording is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Allow `count` more records, then disable.
    ///
    /// Bounds a post-trigger capture window: the interesting event arms the
    /// countdown and a little context after it is kept, then the ring stops
    /// overwriting history. `0` cancels a pending countdown.
    pub fn arm_auto_disable(&mut self, count: u32) {
        self.off_count = count;
    }

    /// Records remaining before auto-disable, `0` if not armed.
    pub fn auto_disable_count(&self) -> u32 {
        self.off_count
    }

    /// Current write cursor (next byte index to be claimed).
    pub fn cursor(&self) -> u32 {
        self.image.cursor
    }

    /// Byte capacity of the ring.
    pub const fn capacity(&self) -> u32 {
        N as u32
    }

    /// Refresh the header and return the full persistable image.
    ///
    /// Never blocks, never allocates; the returned slice aliases the live
    /// buffer and is valid for the duration of the borrow.
    pub fn image(&mut self) -> &[u8] {
        self.image.magic = magic::TRACE;
        self.image.len = Self::IMAGE_BYTES as u32;
        self.image.capacity = N as u32;
        // repr(C) with asserted size: the struct is exactly its bytes.
        unsafe {
            core::slice::from_raw_parts(
                (&self.image as *const TraceImage<N>).cast::<u8>(),
                Self::IMAGE_BYTES,
            )
        }
    }
}

impl<const N: usize> Default for TraceBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a 16-bit argument into the big-endian bytes [`record`] expects.
pub const fn split_u16(v: u16) -> [u8; 2] {
    v.to_be_bytes()
}

/// Split a 32-bit argument into the big-endian bytes [`record`] expects.
pub const fn split_u32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

/// The global trace buffer type.
pub type SystemTraceBuffer = TraceBuffer<{ config::trace::DEFAULT_CAPACITY }>;

/// Snapshot of the global buffer's control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TraceStatus {
    /// Recording enabled.
    pub enabled: bool,
    /// Ring capacity in bytes.
    pub capacity: u32,
    /// Current write cursor.
    pub cursor: u32,
    /// Records left before auto-disable, `0` if not armed.
    pub auto_disable: u32,
}

// Fast-path mirror of the global buffer's enabled flag; checked before the
// critical section is entered.
static ACTIVE: AtomicBool = AtomicBool::new(true);
static BUFFER: Mutex<RefCell<SystemTraceBuffer>> = Mutex::new(RefCell::new(TraceBuffer::new()));

/// Record one event to the global buffer.
///
/// Safe from interrupt context; the critical section nests.
pub fn record(id: u8, args: &[u8]) {
    if !ACTIVE.load(Ordering::Relaxed) {
        return;
    }
    critical_section::with(|cs| {
        let mut buf = BUFFER.borrow_ref_mut(cs);
        buf.record(id, args);
        if !buf.is_enabled() {
            // Auto-disable countdown ran out on this record.
            ACTIVE.store(false, Ordering::Relaxed);
        }
    });
}

/// Enable or disable global recording.
pub fn set_enabled(on: bool) {
    critical_section::with(|cs| BUFFER.borrow_ref_mut(cs).set_enabled(on));
    ACTIVE.store(on, Ordering::Relaxed);
}

/// Whether global recording is enabled.
pub fn is_enabled() -> bool {
    ACTIVE.load(Ordering::Relaxed)
}

/// Arm the global buffer's auto-disable countdown.
pub fn arm_auto_disable(count: u32) {
    critical_section::with(|cs| BUFFER.borrow_ref_mut(cs).arm_auto_disable(count));
}

/// Run `f` over the global buffer's refreshed image.
///
/// The closure executes inside the critical section; keep it short outside
/// the panic path.
pub fn with_image<R>(f: impl FnOnce(&[u8]) -> R) -> R {
    critical_section::with(|cs| {
        let mut buf = BUFFER.borrow_ref_mut(cs);
        f(buf.image())
    })
}

/// Control-state snapshot of the global buffer.
pub fn status() -> TraceStatus {
    critical_section::with(|cs| {
        let buf = BUFFER.borrow_ref(cs);
        TraceStatus {
            enabled: buf.is_enabled(),
            capacity: buf.capacity(),
            cursor: buf.cursor(),
            auto_disable: buf.auto_disable_count(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advances_by_entry_size() {
        let mut t: TraceBuffer<32> = TraceBuffer::new();
        t.record(0x10, &[]);
        assert_eq!(t.cursor(), 1);
        t.record(0x11, &[0xAA]);
        assert_eq!(t.cursor(), 3);
        t.record(0x12, &[1, 2, 3, 4]);
        assert_eq!(t.cursor(), 8);
    }

    #[test]
    fn bytes_are_id_then_args() {
        let mut t: TraceBuffer<32> = TraceBuffer::new();
        t.record(0x42, &split_u16(0xBEEF));
        let img = t.image();
        assert_eq!(&img[HEADER_BYTES..HEADER_BYTES + 3], &[0x42, 0xBE, 0xEF]);
    }

    #[test]
    fn wraps_across_the_boundary() {
        let mut t: TraceBuffer<16> = TraceBuffer::new();
        // 5 entries of 3 bytes = 15; next entry straddles the end.
        for i in 0..5 {
            t.record(i, &[0xA0, 0xA1]);
        }
        assert_eq!(t.cursor(), 15);
        t.record(0x99, &[0xB0, 0xB1]);
        assert_eq!(t.cursor(), 2);
        let img = t.image();
        let buf = &img[HEADER_BYTES..];
        assert_eq!(buf[15], 0x99);
        assert_eq!(buf[0], 0xB0);
        assert_eq!(buf[1], 0xB1);
    }

    #[test]
    fn disabled_buffer_ignores_records() {
        let mut t: TraceBuffer<16> = TraceBuffer::new();
        t.set_enabled(false);
        t.record(1, &[2, 3]);
        assert_eq!(t.cursor(), 0);
        t.set_enabled(true);
        t.record(1, &[2, 3]);
        assert_eq!(t.cursor(), 3);
    }

    #[test]
    fn auto_disable_allows_exactly_n_more() {
        let mut t: TraceBuffer<64> = TraceBuffer::new();
        t.arm_auto_disable(3);
        t.record(1, &[]);
        t.record(2, &[]);
        assert!(t.is_enabled());
        t.record(3, &[]);
        assert!(!t.is_enabled());
        // The third record was still written.
        assert_eq!(t.cursor(), 3);
        t.record(4, &[]);
        assert_eq!(t.cursor(), 3);
    }

    #[test]
    fn reenabling_cancels_countdown() {
        let mut t: TraceBuffer<64> = TraceBuffer::new();
        t.arm_auto_disable(1);
        t.record(1, &[]);
        assert!(!t.is_enabled());
        t.set_enabled(true);
        assert_eq!(t.auto_disable_count(), 0);
        t.record(2, &[]);
        t.record(3, &[]);
        assert!(t.is_enabled());
    }

    #[test]
    fn image_header_is_refreshed() {
        let mut t: TraceBuffer<16> = TraceBuffer::new();
        t.record(7, &[8]);
        let img = t.image();
        assert_eq!(img.len(), 32);
        assert_eq!(&img[0..4], &magic::TRACE.to_le_bytes());
        assert_eq!(&img[4..8], &32u32.to_le_bytes());
        assert_eq!(&img[8..12], &16u32.to_le_bytes());
        assert_eq!(&img[12..16], &2u32.to_le_bytes());
    }

    #[test]
    #[should_panic]
    fn capacity_must_be_multiple_of_16() {
        let _ = TraceBuffer::<10>::new();
    }

    #[test]
    fn split_helpers_are_big_endian() {
        assert_eq!(split_u16(0x1234), [0x12, 0x34]);
        assert_eq!(split_u32(0xDEAD_BEEF), [0xDE, 0xAD, 0xBE, 0xEF]);
    }
}
