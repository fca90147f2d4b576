//! Global trace facade, exercised end to end in a single test.
//!
//! Integration test files each run in their own process, but tests within
//! a file share threads; everything touching the process-wide buffer lives
//! in this one function so nothing can race it.

use crashguard_core::cmd::trace_cmd;
use crashguard_core::config::trace::DEFAULT_CAPACITY;
use crashguard_core::trace::{self, HEADER_BYTES};

#[test]
fn global_buffer_full_lifecycle() {
    // Recording is on from boot, cursor at zero.
    assert!(trace::is_enabled());
    let start = trace::status();
    assert_eq!(start.cursor, 0);
    assert_eq!(start.capacity, DEFAULT_CAPACITY as u32);

    // Direct recording, interrupt-style call sites.
    trace::record(0x10, &[]);
    trace::record(0x11, &trace::split_u16(0xABCD));
    assert_eq!(trace::status().cursor, 4);

    // The image view aliases the live bytes.
    trace::with_image(|img| {
        assert_eq!(img.len(), HEADER_BYTES + DEFAULT_CAPACITY);
        assert_eq!(img[HEADER_BYTES], 0x10);
        assert_eq!(img[HEADER_BYTES + 1], 0x11);
        assert_eq!(img[HEADER_BYTES + 2], 0xAB);
        assert_eq!(img[HEADER_BYTES + 3], 0xCD);
    });

    // Console surface: status, canned test markers, full dump.
    let mut out = String::new();
    trace_cmd(&["status"], &mut out).unwrap();
    assert!(out.contains("enabled:      true"));
    assert!(out.contains("cursor:       4"));

    out.clear();
    trace_cmd(&["test"], &mut out).unwrap();
    assert_eq!(out, "3 test events recorded\n");
    // Marker entries are 1 + 3 + 5 bytes on top of cursor 4.
    assert_eq!(trace::status().cursor, 13);

    out.clear();
    trace_cmd(&["dump"], &mut out).unwrap();
    assert!(out.starts_with("00000000: 01000df0"));
    assert_eq!(out.lines().count(), (HEADER_BYTES + DEFAULT_CAPACITY) / 32);

    // Disable stops recording without touching contents.
    out.clear();
    trace_cmd(&["enable", "0"], &mut out).unwrap();
    assert!(!trace::is_enabled());
    trace::record(0xFE, &[1, 2, 3]);
    assert_eq!(trace::status().cursor, 13);

    trace_cmd(&["enable", "1"], &mut out).unwrap();
    assert!(trace::is_enabled());

    // Bounded post-trigger window: two more records, then off.
    trace::arm_auto_disable(2);
    assert_eq!(trace::status().auto_disable, 2);
    trace::record(0x20, &[]);
    assert!(trace::is_enabled());
    trace::record(0x21, &[]);
    assert!(!trace::is_enabled());
    assert_eq!(trace::status().cursor, 15);

    // Re-enabling cancels any stale countdown.
    trace::set_enabled(true);
    assert_eq!(trace::status().auto_disable, 0);
    assert!(trace::is_enabled());
}
