//! Trace Event Definitions
//!
//! A trace entry on the wire is one id byte plus raw argument bytes; what
//! the id means and how many bytes follow it never leaves the host. This
//! module is the registry for that knowledge. The firmware's built-in
//! `trace-test` events ship with the table; application events are merged
//! in from JSON definitions:
//!
//! ```json
//! [
//!   { "id": 16, "name": "adc-sample", "arg_bytes": [2] },
//!   { "id": 17, "name": "mode-change", "arg_bytes": [1, 1] }
//! ]
//! ```
//!
//! `arg_bytes` lists the width of each argument in bytes, in record order.
//! Argument bytes are stored most-significant first, matching the
//! firmware's `split_u16`/`split_u32` helpers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crashguard_core::cmd::test_events;

use crate::DecodeError;

/// One trace event definition: id, display name, argument widths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSpec {
    /// The id byte recorded in the ring.
    pub id: u8,

    /// Name shown in decoded output.
    pub name: String,

    /// Width in bytes of each argument, in record order. Each width is
    /// 1 to 4 bytes; an empty list means the event has no arguments.
    #[serde(default)]
    pub arg_bytes: Vec<u8>,
}

impl EventSpec {
    /// Total bytes one record of this event occupies in the ring.
    pub fn entry_len(&self) -> usize {
        1 + self.arg_bytes.iter().map(|&w| w as usize).sum::<usize>()
    }

    fn validate(&self) -> Result<(), DecodeError> {
        if self.name.is_empty() {
            return Err(DecodeError::InvalidEvent(format!(
                "event {:#04x} has an empty name",
                self.id
            )));
        }
        if let Some(&w) = self.arg_bytes.iter().find(|&&w| w == 0 || w > 4) {
            return Err(DecodeError::InvalidEvent(format!(
                "event {:#04x} ({}): argument width {} outside 1..=4",
                self.id, self.name, w
            )));
        }
        Ok(())
    }
}

/// Registry of trace event definitions, indexed by id byte.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    events: HashMap<u8, EventSpec>,
    max_entry_len: usize,
}

impl EventTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-loaded with the firmware's `trace-test` events.
    pub fn with_test_events() -> Self {
        let mut table = Self::new();
        for spec in [
            EventSpec {
                id: test_events::MARK,
                name: "mark".to_string(),
                arg_bytes: vec![],
            },
            EventSpec {
                id: test_events::MARK16,
                name: "mark16".to_string(),
                arg_bytes: vec![2],
            },
            EventSpec {
                id: test_events::MARK32,
                name: "mark32".to_string(),
                arg_bytes: vec![4],
            },
        ] {
            table.max_entry_len = table.max_entry_len.max(spec.entry_len());
            table.events.insert(spec.id, spec);
        }
        table
    }

    /// Add one definition. Duplicate ids are an error: two meanings for
    /// one byte would decode the same ring two different ways.
    pub fn register(&mut self, spec: EventSpec) -> Result<(), DecodeError> {
        spec.validate()?;
        if self.events.contains_key(&spec.id) {
            return Err(DecodeError::DuplicateEvent(spec.id));
        }
        self.max_entry_len = self.max_entry_len.max(spec.entry_len());
        self.events.insert(spec.id, spec);
        Ok(())
    }

    /// Merge definitions from JSON text, returning how many were added.
    pub fn extend_from_json(&mut self, json: &str) -> Result<usize, DecodeError> {
        let specs: Vec<EventSpec> =
            serde_json::from_str(json).map_err(|e| DecodeError::EventJson(e.to_string()))?;
        let count = specs.len();
        for spec in specs {
            self.register(spec)?;
        }
        Ok(count)
    }

    /// Definition for an id byte, if known.
    pub fn get(&self, id: u8) -> Option<&EventSpec> {
        self.events.get(&id)
    }

    /// Longest entry any known event produces, in bytes. Bounds the
    /// decoder's start-offset search.
    pub fn max_entry_len(&self) -> usize {
        self.max_entry_len
    }

    /// Number of definitions in the table.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the table has no definitions.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_trace_test_events() {
        let table = EventTable::with_test_events();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0xF0).unwrap().name, "mark");
        assert_eq!(table.get(0xF1).unwrap().arg_bytes, vec![2]);
        assert_eq!(table.get(0xF2).unwrap().arg_bytes, vec![4]);
        // mark32: id byte plus a 4-byte argument.
        assert_eq!(table.max_entry_len(), 5);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut table = EventTable::with_test_events();
        let dup = EventSpec {
            id: 0xF0,
            name: "other".to_string(),
            arg_bytes: vec![],
        };
        assert!(matches!(
            table.register(dup),
            Err(DecodeError::DuplicateEvent(0xF0))
        ));
    }

    #[test]
    fn rejects_bad_argument_widths() {
        let mut table = EventTable::new();
        for bad in [0u8, 5] {
            let spec = EventSpec {
                id: 1,
                name: "bad".to_string(),
                arg_bytes: vec![bad],
            };
            assert!(matches!(
                table.register(spec),
                Err(DecodeError::InvalidEvent(_))
            ));
        }
    }

    #[test]
    fn merges_json_definitions() {
        let mut table = EventTable::with_test_events();
        let added = table
            .extend_from_json(
                r#"[
                    { "id": 16, "name": "adc-sample", "arg_bytes": [2] },
                    { "id": 17, "name": "mode-change", "arg_bytes": [1, 1] },
                    { "id": 18, "name": "tick" }
                ]"#,
            )
            .unwrap();
        assert_eq!(added, 3);
        assert_eq!(table.len(), 6);
        assert_eq!(table.get(17).unwrap().entry_len(), 3);
        assert!(table.get(18).unwrap().arg_bytes.is_empty());
    }

    #[test]
    fn json_errors_carry_context() {
        let mut table = EventTable::new();
        assert!(matches!(
            table.extend_from_json("not json"),
            Err(DecodeError::EventJson(_))
        ));
    }
}
