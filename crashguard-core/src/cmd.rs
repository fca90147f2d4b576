//! Operator Command Handlers
//!
//! ## Overview
//!
//! Thin handlers behind the system console, one per command family. Line
//! editing, tokenizing and dispatch live in the console subsystem; these
//! functions receive the already-split argument words plus the objects they
//! act on, and write human-readable text to an output channel. Every
//! handler returns the crate-wide [`Error`] taxonomy so the console can map
//! failures to its numeric exit codes.
//!
//! Handlers never take globals (the trace commands are the one exception,
//! since the trace buffer itself is global): passing state in keeps them
//! testable with the same mocks the rest of the crate uses.

use core::fmt::Write;

use crate::capture::{dump_hex, StackStatus};
use crate::errors::{Error, Result};
use crate::nvm::device::NvmDevice;
use crate::nvm::NvmDriver;
use crate::processor::{Processor, ResetCause};
use crate::record::SectionKind;
use crate::time::Timestamp;
use crate::trace::{self, split_u16, split_u32};
use crate::wdg::boot::BootState;
use crate::wdg::Supervisor;

/// Event ids emitted by `trace test`, known to the decoder's builtin table.
pub mod test_events {
    /// Marker with no arguments.
    pub const MARK: u8 = 0xF0;
    /// Marker carrying a 16-bit argument.
    pub const MARK16: u8 = 0xF1;
    /// Marker carrying a 32-bit argument.
    pub const MARK32: u8 = 0xF2;
}

/// Parse `0x`-prefixed hex or plain decimal.
fn parse_u32(s: &str) -> Result<u32> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|_| Error::InvalidArg)
}

/// `crash-data [erase]`: dump the persisted diagnostic region, or erase it.
///
/// The dump walks the region section by section and streams hex lines in
/// the same format the panic path uses, so the host decoder accepts either
/// source. Erase clears the page holding the region start, which is enough
/// to defeat the persistence-skip magic check.
pub fn crash_data<D: NvmDevice>(
    args: &[&str],
    driver: &mut NvmDriver<D>,
    region_addr: u32,
    out: &mut dyn Write,
) -> Result<()> {
    match args.first() {
        None => dump_region(driver, region_addr, out),
        Some(&"erase") => {
            driver.erase_page(region_addr)?;
            writeln!(out, "diagnostic region erased")?;
            Ok(())
        }
        Some(_) => Err(Error::InvalidArg),
    }
}

fn dump_region<D: NvmDevice>(
    driver: &NvmDriver<D>,
    region_addr: u32,
    out: &mut dyn Write,
) -> Result<()> {
    let mut offset: u32 = 0;
    loop {
        let mut header = [0u8; 8];
        driver.read(region_addr + offset, &mut header)?;
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let kind = match SectionKind::from_magic(magic) {
            Some(kind) => kind,
            None => {
                if offset == 0 {
                    writeln!(out, "no crash record")?;
                }
                return Ok(());
            }
        };
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if len < 8 || offset.checked_add(len).is_none() {
            return Ok(());
        }

        let mut chunk = [0u8; 32];
        let mut at = 0;
        while at < len {
            let n = (len - at).min(32) as usize;
            driver.read(region_addr + offset + at, &mut chunk[..n])?;
            dump_hex(out, offset + at, &chunk[..n])?;
            at += n as u32;
        }

        offset += len;
        if kind == SectionKind::End {
            return Ok(());
        }
    }
}

/// `crash-status`: stack bounds, high-water mark and last reset cause.
pub fn crash_status(
    status: &StackStatus,
    cause: &ResetCause,
    out: &mut dyn Write,
) -> Result<()> {
    writeln!(out, "stack top:    {:#010x}", status.region.top)?;
    writeln!(out, "guard base:   {:#010x}", status.region.guard_base)?;
    writeln!(out, "usable bytes: {}", status.usable())?;
    writeln!(out, "peak used:    {}", status.peak_used())?;
    writeln!(out, "current used: {}", status.current_used())?;
    writeln!(out, "reset cause:  {} ({:#010x})", cause, cause.raw)?;
    Ok(())
}

/// `crash-test report <type> <param>` / `crash-test stack` /
/// `crash-test ptr`: exercise the capture path.
///
/// `report` hands the parsed values to the caller's fault reporter, which
/// on a live system enters the panic path and never returns. `stack` and
/// `ptr` provoke the real thing and never return at all.
pub fn crash_test(
    args: &[&str],
    processor: &mut dyn Processor,
    report: &mut dyn FnMut(u32, u32),
) -> Result<()> {
    match args {
        ["report", kind, param] => {
            let kind = parse_u32(kind)?;
            let param = parse_u32(param)?;
            report(kind, param);
            Ok(())
        }
        ["stack"] => processor.provoke_stack_overflow(),
        ["ptr"] => processor.provoke_invalid_access(),
        _ => Err(Error::InvalidArg),
    }
}

/// `watchdog-status`: client table plus escalation state.
pub fn watchdog_status<const MAX: usize>(
    supervisor: &Supervisor<MAX>,
    boot_state: &BootState,
    now: Timestamp,
    out: &mut dyn Write,
) -> Result<()> {
    writeln!(out, "id  period_ms   last_feed  elapsed_ms")?;
    for client in supervisor.clients() {
        writeln!(
            out,
            "{:>2}  {:>9}  {:>10}  {:>10}",
            client.id,
            client.period_ms,
            client.last_feed,
            now.saturating_sub(client.last_feed)
        )?;
    }
    writeln!(out, "clients: {}/{}", supervisor.client_count(), MAX)?;
    writeln!(
        out,
        "check: {}",
        if supervisor.is_check_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    )?;
    writeln!(out, "failed inits: {}", boot_state.failed_inits())?;
    Ok(())
}

/// `watchdog-test fail-hw|disable|enable|init-fails N`: supervision test
/// hooks.
///
/// `enable` restores normal operation, clearing both the fail-hardware
/// simulation and a suspended check.
pub fn watchdog_test<const MAX: usize>(
    args: &[&str],
    supervisor: &mut Supervisor<MAX>,
    boot_state: &mut BootState,
    out: &mut dyn Write,
) -> Result<()> {
    match args {
        ["fail-hw"] => {
            supervisor.set_fail_hardware(true);
            writeln!(out, "hardware feed suppressed; expect a hardware reset")?;
            Ok(())
        }
        ["disable"] => {
            supervisor.set_check_enabled(false);
            writeln!(out, "client checking suspended")?;
            Ok(())
        }
        ["enable"] => {
            supervisor.set_check_enabled(true);
            supervisor.set_fail_hardware(false);
            writeln!(out, "supervision restored")?;
            Ok(())
        }
        ["init-fails", count] => {
            let count = parse_u32(count)?;
            boot_state.set_failed_inits(count);
            writeln!(out, "failed-init counter set to {}", count)?;
            Ok(())
        }
        _ => Err(Error::InvalidArg),
    }
}

/// `trace status|enable {0,1}|dump|test`: control and inspect the global
/// trace buffer.
pub fn trace_cmd(args: &[&str], out: &mut dyn Write) -> Result<()> {
    match args {
        ["status"] => {
            let status = trace::status();
            writeln!(out, "enabled:      {}", status.enabled)?;
            writeln!(out, "capacity:     {}", status.capacity)?;
            writeln!(out, "cursor:       {}", status.cursor)?;
            writeln!(out, "auto-disable: {}", status.auto_disable)?;
            Ok(())
        }
        ["enable", value] => {
            let on = match parse_u32(value)? {
                0 => false,
                1 => true,
                _ => return Err(Error::InvalidArg),
            };
            trace::set_enabled(on);
            writeln!(out, "trace {}", if on { "enabled" } else { "disabled" })?;
            Ok(())
        }
        ["dump"] => {
            trace::with_image(|image| dump_hex(out, 0, image))?;
            Ok(())
        }
        ["test"] => {
            trace::record(test_events::MARK, &[]);
            trace::record(test_events::MARK16, &split_u16(0xBEEF));
            trace::record(test_events::MARK32, &split_u32(0xDEAD_BEEF));
            writeln!(out, "3 test events recorded")?;
            Ok(())
        }
        _ => Err(Error::InvalidArg),
    }
}
