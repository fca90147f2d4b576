//! Firmware bytes in, human-readable report out: the full decode pipeline
//! fed from files the way the command-line tool reads them.

use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::Write as IoWrite;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tempfile::NamedTempFile;

use crashguard_core::capture::{process_fault, CaptureConfig};
use crashguard_core::cmd::test_events;
use crashguard_core::nvm::device::NvmGeometry;
use crashguard_core::nvm::memory::MemNvm;
use crashguard_core::nvm::NvmDriver;
use crashguard_core::processor::MockProcessor;
use crashguard_core::record::FaultKind;
use crashguard_core::trace::TraceBuffer;
use crashguard_core::wdg::MockWatchdog;

use crashguard_decoder::{decode_region, region_from_file_bytes, EventTable};

/// Crash a mock system and return what it left behind: the persisted
/// region and the console transcript.
fn crashed_device(kind: FaultKind, param: u32) -> (Vec<u8>, String) {
    let geometry = NvmGeometry {
        base: 0,
        page_size: 2048,
        pages: 2,
        banks: 1,
        write_bytes: 8,
    };
    let mut driver = NvmDriver::new(MemNvm::<4096>::new(geometry));
    let mut processor = MockProcessor::new();
    let mut watchdog = MockWatchdog::new();

    let mut buffer: TraceBuffer<32> = TraceBuffer::new();
    buffer.record(test_events::MARK, &[]);
    buffer.record(test_events::MARK16, &[0x12, 0x34]);
    buffer.record(test_events::MARK32, &[0xDE, 0xAD, 0xBE, 0xEF]);
    let image = buffer.image().to_vec();

    let config = CaptureConfig::new(0);
    let mut console = String::new();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        process_fault(
            kind,
            param,
            None,
            &mut processor,
            &mut watchdog,
            &mut driver,
            &config,
            Some(&mut console as &mut dyn FmtWrite),
            61_000,
            &image,
        );
    }));
    assert!(outcome.is_err(), "the fault path must end in a reset");

    (driver.device().contents().to_vec(), console)
}

#[test]
fn raw_region_file_decodes_end_to_end() {
    let (region_bytes, _) = crashed_device(FaultKind::Software, 42);

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&region_bytes).unwrap();

    let bytes = fs::read(file.path()).unwrap();
    let region = region_from_file_bytes(&bytes).unwrap();
    let report = decode_region(&region, &EventTable::with_test_events()).unwrap();

    let snap = report.snapshot.unwrap();
    assert_eq!(snap.kind, FaultKind::Software.as_u32());
    assert_eq!(snap.param, 42);
    assert_eq!(snap.uptime_ms, 61_000);

    let trace = report.trace.unwrap();
    let decoded: Vec<(String, Vec<u32>)> = trace
        .events
        .iter()
        .map(|e| (e.name.clone(), e.args.clone()))
        .collect();
    assert_eq!(
        decoded,
        vec![
            ("mark".to_string(), vec![]),
            ("mark16".to_string(), vec![0x1234]),
            ("mark32".to_string(), vec![0xDEAD_BEEF]),
        ]
    );
    assert!(report.complete);
}

#[test]
fn console_transcript_decodes_like_the_raw_region() {
    let (region_bytes, console) = crashed_device(FaultKind::Exception, 3);

    // The transcript as an operator would save it, prompts and all.
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "> crash data dump").unwrap();
    file.write_all(console.as_bytes()).unwrap();
    writeln!(file, "> ").unwrap();

    let bytes = fs::read(file.path()).unwrap();
    let from_text = region_from_file_bytes(&bytes).unwrap();
    let table = EventTable::with_test_events();

    let text_report = decode_region(&from_text, &table).unwrap();
    let raw_report = decode_region(&region_bytes, &table).unwrap();

    assert_eq!(text_report.to_json(), raw_report.to_json());
    assert!(text_report.complete);
    assert_eq!(text_report.snapshot.unwrap().param, 3);
}

#[test]
fn application_events_merge_from_a_json_file() {
    let mut defs = NamedTempFile::new().unwrap();
    write!(
        defs,
        r#"[
            {{ "id": 16, "name": "adc-sample", "arg_bytes": [2] }},
            {{ "id": 17, "name": "mode-change", "arg_bytes": [1, 1] }}
        ]"#
    )
    .unwrap();

    let mut table = EventTable::with_test_events();
    let json = fs::read_to_string(defs.path()).unwrap();
    assert_eq!(table.extend_from_json(&json).unwrap(), 2);

    // A ring recorded with application ids decodes by name.
    let mut buffer: TraceBuffer<16> = TraceBuffer::new();
    buffer.record(16, &[0x01, 0xF4]);
    buffer.record(17, &[2, 5]);

    let mut section = Vec::new();
    section.extend_from_slice(buffer.image());
    let report = crashguard_decoder::TraceReport::from_section(&section, &table).unwrap();
    let names: Vec<&str> = report.events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["adc-sample", "mode-change"]);
    assert_eq!(report.events[0].args, vec![0x01F4]);
    assert_eq!(report.events[1].args, vec![2, 5]);
}
