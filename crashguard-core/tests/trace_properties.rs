//! Property tests for the trace ring: cursor math and byte placement hold
//! for every argument length the call sites use (0–4 bytes), from any
//! starting cursor position.

use proptest::prelude::*;

use crashguard_core::trace::{TraceBuffer, HEADER_BYTES};

const CAP: usize = 48;

fn warmup_entries() -> impl Strategy<Value = Vec<(u8, usize)>> {
    prop::collection::vec((any::<u8>(), 0usize..=4), 0..40)
}

proptest! {
    #[test]
    fn cursor_advances_by_one_plus_len_modulo_capacity(
        id in any::<u8>(),
        args in prop::collection::vec(any::<u8>(), 0..=4),
        warmup in warmup_entries(),
    ) {
        let mut t: TraceBuffer<CAP> = TraceBuffer::new();
        for (wid, wlen) in &warmup {
            t.record(*wid, &[0xEE; 4][..*wlen]);
        }
        let before = t.cursor();
        t.record(id, &args);
        prop_assert_eq!(t.cursor(), (before + 1 + args.len() as u32) % CAP as u32);
    }

    #[test]
    fn bytes_land_as_id_then_args_in_ring_order(
        id in any::<u8>(),
        args in prop::collection::vec(any::<u8>(), 0..=4),
        warmup in warmup_entries(),
    ) {
        let mut t: TraceBuffer<CAP> = TraceBuffer::new();
        for (wid, wlen) in &warmup {
            t.record(*wid, &[0xEE; 4][..*wlen]);
        }
        let at = t.cursor() as usize;
        t.record(id, &args);

        let img = t.image();
        let ring = &img[HEADER_BYTES..];
        prop_assert_eq!(ring[at], id);
        for (i, &b) in args.iter().enumerate() {
            prop_assert_eq!(ring[(at + 1 + i) % CAP], b);
        }
    }

    #[test]
    fn auto_disable_admits_exactly_n_more_records(
        n in 1u32..16,
        extra in 0u32..8,
    ) {
        let mut t: TraceBuffer<64> = TraceBuffer::new();
        t.arm_auto_disable(n);
        for i in 0..(n + extra) {
            t.record(i as u8, &[]);
        }
        prop_assert!(!t.is_enabled());
        // One byte per record: the cursor counts exactly the admitted ones.
        prop_assert_eq!(t.cursor(), n);
    }

    #[test]
    fn image_always_reports_magic_length_and_cursor(
        warmup in warmup_entries(),
    ) {
        let mut t: TraceBuffer<CAP> = TraceBuffer::new();
        for (wid, wlen) in &warmup {
            t.record(*wid, &[0x11; 4][..*wlen]);
        }
        let cursor = t.cursor();
        let img = t.image();
        prop_assert_eq!(img.len(), HEADER_BYTES + CAP);
        prop_assert_eq!(&img[0..4], &0xF00D_0001u32.to_le_bytes());
        prop_assert_eq!(&img[4..8], &((HEADER_BYTES + CAP) as u32).to_le_bytes());
        prop_assert_eq!(&img[8..12], &(CAP as u32).to_le_bytes());
        prop_assert_eq!(&img[12..16], &cursor.to_le_bytes());
    }
}
