//! Region Reports
//!
//! [`decode_region`] walks a diagnostic region with the firmware's own
//! section iterator and assembles everything it recognizes into a
//! [`RegionReport`]: the parsed fault snapshot, the decoded trace ring, and
//! whether the end marker was reached. An erased or empty region is not an
//! error, it decodes to a report with nothing in it.
//!
//! [`SnapshotReport`] is the presentation side: the snapshot flattened to
//! named fields in stored order, ready for a terminal table or JSON.

use core::fmt;

use serde::Serialize;
use serde_json::json;

use crashguard_core::record::{sections, FaultKind, FaultSnapshot, SectionKind};

use crate::events::EventTable;
use crate::trace::TraceReport;
use crate::DecodeError;

/// Everything recovered from one diagnostic region.
#[derive(Debug, Clone)]
pub struct RegionReport {
    /// Parsed fault snapshot, `None` when the region never held one or the
    /// stored bytes no longer parse.
    pub snapshot: Option<FaultSnapshot>,

    /// Decoded trace ring, `None` when the region has no trace section.
    pub trace: Option<TraceReport>,

    /// Whether the walk reached the end marker. `false` means the region
    /// was cut short, usually a persist interrupted by power loss.
    pub complete: bool,
}

impl RegionReport {
    /// The snapshot flattened to named fields, if one was recovered.
    pub fn snapshot_report(&self) -> Option<SnapshotReport> {
        self.snapshot.as_ref().map(SnapshotReport::new)
    }

    /// The whole report as a JSON value with a stable shape:
    /// `{ complete, snapshot, trace }`.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "complete": self.complete,
            "snapshot": self.snapshot_report(),
            "trace": self.trace,
        })
    }
}

impl fmt::Display for RegionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.snapshot_report() {
            Some(snap) => write!(f, "{snap}")?,
            None => writeln!(f, "no fault snapshot (nothing captured, or region erased)")?,
        }
        if let Some(trace) = &self.trace {
            write!(f, "{trace}")?;
        }
        if self.complete {
            writeln!(f, "end marker: present")
        } else {
            writeln!(f, "end marker: missing (region cut short)")
        }
    }
}

/// Decode a diagnostic region against an event table.
///
/// Sections are walked by magic + length; the walk stops at the end marker
/// or at the first thing it does not recognize, exactly as the firmware's
/// own reader does. A trace section whose header contradicts itself fails
/// the decode with [`DecodeError::MalformedTrace`].
pub fn decode_region(region: &[u8], table: &EventTable) -> Result<RegionReport, DecodeError> {
    let mut snapshot = None;
    let mut trace = None;
    let mut complete = false;
    for section in sections(region) {
        match section.kind {
            SectionKind::Fault => {
                if snapshot.is_none() {
                    snapshot = FaultSnapshot::read_from(section.bytes);
                }
            }
            SectionKind::Trace => {
                if trace.is_none() {
                    trace = Some(TraceReport::from_section(section.bytes, table)?);
                }
            }
            SectionKind::End => complete = true,
        }
    }
    Ok(RegionReport {
        snapshot,
        trace,
        complete,
    })
}

/// One named register value from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterField {
    /// Field name as rendered in reports.
    pub name: &'static str,

    /// Raw 32-bit value as stored.
    pub value: u32,
}

/// A fault snapshot flattened to named fields in stored order.
///
/// Values stay raw; the firmware stores registers without interpretation
/// and so does the report. Only the fault kind is resolved to a name.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotReport {
    /// Fault class name, `unknown(N)` for values outside the known set.
    pub kind: String,

    /// Raw kind value as stored.
    pub kind_raw: u32,

    /// Free-form parameter supplied by the reporting site.
    pub param: u32,

    /// Uptime at capture in milliseconds.
    pub uptime_ms: u32,

    /// Registers in stored order.
    pub registers: Vec<RegisterField>,
}

impl SnapshotReport {
    /// Flatten a parsed snapshot.
    pub fn new(snap: &FaultSnapshot) -> SnapshotReport {
        let kind = match FaultKind::from_u32(snap.kind) {
            Some(k) => k.name().to_string(),
            None => format!("unknown({})", snap.kind),
        };
        let registers = vec![
            RegisterField { name: "frame_r0", value: snap.frame.r0 },
            RegisterField { name: "frame_r1", value: snap.frame.r1 },
            RegisterField { name: "frame_r2", value: snap.frame.r2 },
            RegisterField { name: "frame_r3", value: snap.frame.r3 },
            RegisterField { name: "frame_r12", value: snap.frame.r12 },
            RegisterField { name: "frame_lr", value: snap.frame.lr },
            RegisterField { name: "return_addr", value: snap.frame.return_addr },
            RegisterField { name: "xpsr", value: snap.frame.xpsr },
            RegisterField { name: "sp", value: snap.sp },
            RegisterField { name: "lr", value: snap.lr },
            RegisterField { name: "ipsr", value: snap.ipsr },
            RegisterField { name: "icsr", value: snap.icsr },
            RegisterField { name: "shcsr", value: snap.shcsr },
            RegisterField { name: "cfsr", value: snap.cfsr },
            RegisterField { name: "hfsr", value: snap.hfsr },
            RegisterField { name: "mmfar", value: snap.mmfar },
            RegisterField { name: "bfar", value: snap.bfar },
        ];
        SnapshotReport {
            kind,
            kind_raw: snap.kind,
            param: snap.param,
            uptime_ms: snap.uptime_ms,
            registers,
        }
    }
}

impl fmt::Display for SnapshotReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "fault: {} (kind {}), param {}, uptime {} ms",
            self.kind, self.kind_raw, self.param, self.uptime_ms
        )?;
        let width = self
            .registers
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0);
        for reg in &self.registers {
            writeln!(
                f,
                "  {:>width$}: {:#010x} ({})",
                reg.name, reg.value, reg.value
            )?;
        }
        Ok(())
    }
}
