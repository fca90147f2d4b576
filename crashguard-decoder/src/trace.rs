//! Trace Ring Decoding
//!
//! The persisted trace section is a 16-byte header (magic, total length,
//! capacity, write cursor) followed by the raw ring. The cursor is the next
//! write position, so it also marks the oldest byte; decoding starts there
//! and walks forward until it comes back around.
//!
//! Two things complicate the walk. The cursor may point into the middle of
//! an entry whose id byte was overwritten laps ago, so the decoder first
//! searches the offsets `0..=max_entry_len` past the cursor and keeps the
//! one that produces the fewest unknown ids. And because the firmware moves
//! the cursor before it stores an entry's bytes, a crash can leave the last
//! entry half written; the walk reports whatever follows the final complete
//! entry as an unused tail instead of failing.

use core::fmt;

use serde::Serialize;

use crashguard_core::config::magic;
use crashguard_core::trace::HEADER_BYTES;

use crate::events::EventTable;
use crate::DecodeError;

/// One decoded trace entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedEvent {
    /// The id byte as recorded.
    pub id: u8,

    /// Display name from the event table.
    pub name: String,

    /// Argument values in record order, assembled most-significant byte
    /// first.
    pub args: Vec<u32>,

    /// Bytes with no known id that were skipped to reach this entry.
    /// Usually leftovers of an overwritten entry, or ring bytes that were
    /// never written.
    pub skipped_before: Vec<u8>,
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "(")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg:#x}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Decoded contents of one trace section.
#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    /// Ring capacity in bytes, from the section header.
    pub capacity: u32,

    /// Write cursor at capture, from the section header.
    pub cursor: u32,

    /// Bytes between the cursor and the entry boundary the sync search
    /// settled on. Nonzero when the oldest entry was partially overwritten.
    pub start_offset: u32,

    /// Complete entries, oldest first.
    pub events: Vec<DecodedEvent>,

    /// Ring bytes after the last complete entry. A short tail here is the
    /// expected trace of a crash that interrupted a record in progress.
    pub unused_tail: Vec<u8>,
}

impl TraceReport {
    /// Decode a trace section (header included) against an event table.
    ///
    /// Fails with [`DecodeError::MalformedTrace`] when the header
    /// contradicts itself or the slice it arrived in.
    pub fn from_section(section: &[u8], table: &EventTable) -> Result<TraceReport, DecodeError> {
        let malformed = |reason: String| DecodeError::MalformedTrace(reason);

        if section.len() < HEADER_BYTES {
            return Err(malformed(format!(
                "section holds {} bytes, the header alone needs {}",
                section.len(),
                HEADER_BYTES
            )));
        }
        let word = |i: usize| {
            let o = i * 4;
            u32::from_le_bytes([section[o], section[o + 1], section[o + 2], section[o + 3]])
        };
        if word(0) != magic::TRACE {
            return Err(malformed(format!(
                "magic {:#010x} is not a trace section",
                word(0)
            )));
        }
        let len = word(1) as usize;
        let capacity = word(2) as usize;
        let cursor = word(3) as usize;
        if len != section.len() {
            return Err(malformed(format!(
                "header says {} bytes but the section holds {}",
                len,
                section.len()
            )));
        }
        if capacity == 0 || capacity + HEADER_BYTES != len {
            return Err(malformed(format!(
                "capacity {capacity} disagrees with section length {len}"
            )));
        }
        if cursor >= capacity {
            return Err(malformed(format!(
                "cursor {cursor} outside ring of {capacity} bytes"
            )));
        }

        let ring = &section[HEADER_BYTES..];
        let start_offset = best_start_offset(ring, cursor, table);
        let start = (cursor + start_offset) % capacity;

        let mut reader = RingReader::new(ring, start, cursor, start_offset == 0);
        let mut events = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        // Position just past the last complete entry; everything after it
        // becomes the unused tail.
        let mut tail = reader;

        loop {
            let Some(id) = reader.take() else { break };
            let Some(spec) = table.get(id) else {
                pending.push(id);
                continue;
            };
            let mut args = Vec::with_capacity(spec.arg_bytes.len());
            let mut complete = true;
            'args: for &width in &spec.arg_bytes {
                let mut value = 0u32;
                for _ in 0..width {
                    let Some(b) = reader.take() else {
                        complete = false;
                        break 'args;
                    };
                    value = value << 8 | u32::from(b);
                }
                args.push(value);
            }
            if !complete {
                break;
            }
            events.push(DecodedEvent {
                id,
                name: spec.name.clone(),
                args,
                skipped_before: core::mem::take(&mut pending),
            });
            tail = reader;
        }

        let mut unused_tail = Vec::new();
        while let Some(b) = tail.take() {
            unused_tail.push(b);
        }

        Ok(TraceReport {
            capacity: capacity as u32,
            cursor: cursor as u32,
            start_offset: start_offset as u32,
            events,
            unused_tail,
        })
    }
}

impl fmt::Display for TraceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "trace: {} event(s), capacity {} bytes, cursor {}",
            self.events.len(),
            self.capacity,
            self.cursor
        )?;
        if self.start_offset > 0 {
            writeln!(f, "  synced {} byte(s) past the cursor", self.start_offset)?;
        }
        for event in &self.events {
            if !event.skipped_before.is_empty() {
                writeln!(f, "  {}", hex_run("skipped", &event.skipped_before))?;
            }
            writeln!(f, "  {event}")?;
        }
        if !self.unused_tail.is_empty() {
            writeln!(f, "  {}", hex_run("unused tail", &self.unused_tail))?;
        }
        Ok(())
    }
}

/// Render a byte run as `label 3 byte(s) (hex): aa bb cc`, elided past 16.
fn hex_run(label: &str, bytes: &[u8]) -> String {
    let mut out = format!("{label} {} byte(s) (hex):", bytes.len());
    for b in bytes.iter().take(16) {
        out.push_str(&format!(" {b:02x}"));
    }
    if bytes.len() > 16 {
        out.push_str(&format!(" .. +{} more", bytes.len() - 16));
    }
    out
}

/// Reads ring bytes oldest-to-newest, stopping at the write cursor.
///
/// `fresh` is true only for a reader starting exactly at the cursor, where
/// the whole ring is readable and the stop check must be deferred by one
/// byte.
#[derive(Clone, Copy)]
struct RingReader<'a> {
    ring: &'a [u8],
    idx: usize,
    stop: usize,
    fresh: bool,
}

impl<'a> RingReader<'a> {
    fn new(ring: &'a [u8], start: usize, stop: usize, fresh: bool) -> Self {
        Self {
            ring,
            idx: start,
            stop,
            fresh,
        }
    }

    fn take(&mut self) -> Option<u8> {
        if self.idx == self.stop && !self.fresh {
            return None;
        }
        self.fresh = false;
        let b = self.ring[self.idx];
        self.idx = (self.idx + 1) % self.ring.len();
        Some(b)
    }
}

/// Brute-force sync: try each start offset past the cursor and keep the
/// first one that minimizes unknown ids. An entry interrupted by the ring
/// end is not counted against an offset.
fn best_start_offset(ring: &[u8], cursor: usize, table: &EventTable) -> usize {
    let mut best_offset = 0;
    let mut best_unknown = usize::MAX;
    let max_offset = table.max_entry_len().min(ring.len() - 1);
    for offset in 0..=max_offset {
        let start = (cursor + offset) % ring.len();
        let mut reader = RingReader::new(ring, start, cursor, offset == 0);
        let mut unknown = 0usize;
        'scan: while let Some(id) = reader.take() {
            let Some(spec) = table.get(id) else {
                unknown += 1;
                continue;
            };
            for _ in 1..spec.entry_len() {
                if reader.take().is_none() {
                    break 'scan;
                }
            }
        }
        if unknown < best_unknown {
            best_unknown = unknown;
            best_offset = offset;
        }
    }
    best_offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashguard_core::cmd::test_events;
    use crashguard_core::trace::TraceBuffer;

    fn section(capacity: u32, cursor: u32, ring: &[u8]) -> Vec<u8> {
        assert_eq!(ring.len(), capacity as usize);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&magic::TRACE.to_le_bytes());
        bytes.extend_from_slice(&(HEADER_BYTES as u32 + capacity).to_le_bytes());
        bytes.extend_from_slice(&capacity.to_le_bytes());
        bytes.extend_from_slice(&cursor.to_le_bytes());
        bytes.extend_from_slice(ring);
        bytes
    }

    #[test]
    fn syncs_past_partially_overwritten_oldest_entry() {
        // Four 5-byte entries in a 16-byte ring: the fourth overwrites all
        // of the first except its final argument byte.
        let mut ring: TraceBuffer<16> = TraceBuffer::new();
        ring.record(test_events::MARK32, &[0x11, 0x22, 0x33, 0x44]);
        ring.record(test_events::MARK32, &[0x55, 0x66, 0x77, 0x88]);
        ring.record(test_events::MARK32, &[0x99, 0xAA, 0xBB, 0xCC]);
        ring.record(test_events::MARK32, &[0xDD, 0xEE, 0xFF, 0x10]);

        let table = EventTable::with_test_events();
        let report = TraceReport::from_section(ring.image(), &table).unwrap();

        assert_eq!(report.cursor, 4);
        assert_eq!(report.start_offset, 1);
        let args: Vec<u32> = report.events.iter().map(|e| e.args[0]).collect();
        assert_eq!(args, vec![0x5566_7788, 0x99AA_BBCC, 0xDDEE_FF10]);
        assert!(report.events.iter().all(|e| e.skipped_before.is_empty()));
        assert!(report.unused_tail.is_empty());
    }

    #[test]
    fn decodes_mid_ring_unknown_bytes_as_skipped() {
        let ring = [
            0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, // six marks
            0x55, // not an id in the table
            0xF1, 0xAA, 0xBB, // mark16
            0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, // six marks
        ];
        let table = EventTable::with_test_events();
        let report = TraceReport::from_section(&section(16, 0, &ring), &table).unwrap();

        assert_eq!(report.start_offset, 0);
        assert_eq!(report.events.len(), 13);
        assert_eq!(report.events[6].name, "mark16");
        assert_eq!(report.events[6].args, vec![0xAABB]);
        assert_eq!(report.events[6].skipped_before, vec![0x55]);
        assert!(report.unused_tail.is_empty());
    }

    #[test]
    fn reports_interrupted_final_entry_as_unused_tail() {
        // A mark32 id whose arguments run out at the cursor, the shape a
        // crash inside record() leaves behind.
        let ring = [
            0xF0, // mark
            0xF1, 0xAA, 0xBB, // mark16
            0xF0, // mark
            0xF1, 0xCC, 0xDD, // mark16
            0xF1, 0xEE, 0xFF, // mark16
            0xF0, 0xF0, 0xF0, // marks
            0xF2, 0x99, // mark32 cut short
        ];
        let table = EventTable::with_test_events();
        let report = TraceReport::from_section(&section(16, 0, &ring), &table).unwrap();

        assert_eq!(report.events.len(), 8);
        assert_eq!(report.events.last().unwrap().name, "mark");
        assert_eq!(report.unused_tail, vec![0xF2, 0x99]);
    }

    #[test]
    fn unknown_only_ring_decodes_to_no_events() {
        let ring = [0u8; 16];
        let report =
            TraceReport::from_section(&section(16, 0, &ring), &EventTable::new()).unwrap();
        assert!(report.events.is_empty());
        assert_eq!(report.unused_tail.len(), 16);
    }

    #[test]
    fn header_contradictions_are_malformed() {
        let table = EventTable::with_test_events();
        let good = section(16, 0, &[0u8; 16]);

        let mut wrong_magic = good.clone();
        wrong_magic[0] ^= 0xFF;
        let mut wrong_len = good.clone();
        wrong_len[4] = 0x99;
        let mut wrong_capacity = good.clone();
        wrong_capacity[8] = 8;
        let mut wild_cursor = good.clone();
        wild_cursor[12] = 200;

        for bad in [
            &good[..12],
            &wrong_magic[..],
            &wrong_len[..],
            &wrong_capacity[..],
            &wild_cursor[..],
        ] {
            assert!(matches!(
                TraceReport::from_section(bad, &table),
                Err(DecodeError::MalformedTrace(_))
            ));
        }

        assert!(TraceReport::from_section(&good, &table).is_ok());
    }

    #[test]
    fn display_renders_events_and_tail() {
        let ring = [
            0xF1, 0x12, 0x34, // mark16
            0xF2, 0x99, 0x99, 0x99, 0x99, // mark32
            0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, // marks
            0xF2, // a lone id, cut short
        ];
        let table = EventTable::with_test_events();
        let report = TraceReport::from_section(&section(16, 0, &ring), &table).unwrap();
        let text = report.to_string();
        assert!(text.contains("mark16(0x1234)"));
        assert!(text.contains("mark32(0x99999999)"));
        assert!(text.contains("unused tail 1 byte(s) (hex): f2"));
    }
}
