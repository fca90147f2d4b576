//! Console Hex-Dump Parsing
//!
//! The firmware mirrors every persisted region to the console as
//! `offset: bytes` lines, 32 bytes per line, offsets in 8-digit hex
//! starting at zero. This module parses that text back into region bytes.
//!
//! Capture sessions rarely contain just the dump, so anything that does
//! not look like a dump line (prompts, panic banners, blank lines) is
//! skipped. Lines that do look like dump lines are held to the wire
//! format: whole bytes only in both fields, and offsets that continue
//! exactly where the previous line stopped. A gap means the terminal
//! dropped data, and a silently truncated region decodes into confidently
//! wrong output, so gaps are errors rather than warnings.

use crate::DecodeError;

/// Longest all-hex suffix of `s`.
fn trailing_hex(s: &str) -> &str {
    let start = s
        .bytes()
        .rposition(|b| !b.is_ascii_hexdigit())
        .map(|i| i + 1)
        .unwrap_or(0);
    &s[start..]
}

/// Longest all-hex prefix of `s`.
fn leading_hex(s: &str) -> &str {
    let end = s
        .bytes()
        .position(|b| !b.is_ascii_hexdigit())
        .unwrap_or(s.len());
    &s[..end]
}

/// The (offset, data) hex fields of a dump line, if the line has the
/// `<hex>: <hex>` shape at its first colon.
fn dump_fields(line: &str) -> Option<(&str, &str)> {
    let (left, right) = line.split_once(':')?;
    let offset_hex = trailing_hex(left.trim_end());
    let data_hex = leading_hex(right.trim_start());
    if offset_hex.is_empty() || data_hex.is_empty() {
        return None;
    }
    Some((offset_hex, data_hex))
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

/// Parse console hex-dump text into region bytes.
///
/// Non-dump lines are ignored. Dump lines must carry whole bytes and
/// contiguous offsets starting at zero; violations report the 1-based
/// line number.
pub fn parse_hex_dump(text: &str) -> Result<Vec<u8>, DecodeError> {
    let mut bytes = Vec::new();
    let mut expected: u64 = 0;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let Some((offset_hex, data_hex)) = dump_fields(raw) else {
            continue;
        };

        if offset_hex.len() % 2 != 0 {
            return Err(DecodeError::HexDump {
                line,
                reason: format!("odd number of hex digits ({}) in offset field", offset_hex.len()),
            });
        }
        if data_hex.len() % 2 != 0 {
            return Err(DecodeError::HexDump {
                line,
                reason: format!("odd number of hex digits ({}) in data field", data_hex.len()),
            });
        }

        let offset = u64::from_str_radix(offset_hex, 16).map_err(|_| DecodeError::HexDump {
            line,
            reason: format!("offset 0x{offset_hex} out of range"),
        })?;
        if offset != expected {
            return Err(DecodeError::HexDump {
                line,
                reason: format!("expected offset {expected:#010x}, got {offset:#010x}"),
            });
        }

        let data = data_hex.as_bytes();
        for pair in data.chunks_exact(2) {
            bytes.push(hex_value(pair[0]) << 4 | hex_value(pair[1]));
        }
        expected += (data.len() / 2) as u64;
    }

    Ok(bytes)
}

/// Region bytes from a file's content, whichever form it is in.
///
/// Text containing dump lines is parsed as a console dump; everything
/// else passes through untouched as a raw region image. A persisted
/// region always starts with a little-endian magic whose bytes are not
/// valid UTF-8 text, so the two forms cannot be confused in practice.
pub fn region_from_file_bytes(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        if text.lines().any(|l| dump_fields(l).is_some()) {
            return parse_hex_dump(text);
        }
    }
    Ok(bytes.to_vec())
}
