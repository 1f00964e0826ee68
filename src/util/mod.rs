mod buffer;

pub use self::buffer::{Buffer, ByteOrder};

use std::fmt;

const HEX_COLUMNS: usize = 16;

/// Write one hex dump line per 16 bytes, with each line starting at
/// `base + offset`.  A non-empty `prefix` is written in front of every line.
pub fn hexdump<W: fmt::Write>(out: &mut W, prefix: &str, base: usize, bytes: &[u8]) -> fmt::Result {
    for (row_number, row) in bytes.chunks(HEX_COLUMNS).enumerate() {
        if row_number > 0 {
            out.write_char('\n')?;
        }
        write!(out, "{}{:04x}: ", prefix, base + row_number * HEX_COLUMNS)?;
        for b in row {
            write!(out, "{:02x} ", b)?;
        }
        for _ in row.len()..HEX_COLUMNS {
            out.write_str("   ")?;
        }
        for b in row {
            out.write_char(printable(*b))?;
        }
    }
    Ok(())
}

#[inline]
fn printable(byte: u8) -> char {
    match byte {
        c @ 0x20..=0x7E => c as char,
        _ => '.',
    }
}

/// Render bytes that are mostly PETSCII text for display.  Shifted spaces
/// show as spaces and anything else unprintable as '?'.
pub fn petscii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match *b {
            c @ 0x20..=0x5F => c as char,
            c @ 0xC1..=0xDA => (c - 0x80) as char,
            0xA0 => ' ',
            _ => '?',
        })
        .collect()
}
