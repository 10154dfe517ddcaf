//! The record model: one parsed `<number>. <text>` line.
//!
//! Parsing is deliberately strict (digits, a dot, a single space, at least
//! one text byte) and rejection is silent: junk lines are dropped rather
//! than aborting a multi-hour sort.

use std::cmp::Ordering;
use std::io::{self, Write};

/// A parsed line. `text` owns its bytes so a record never pins the input
/// buffer it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Non-negative, parsed with 32-bit signed width. Lines whose number
    /// exceeds `i32::MAX` fail to parse.
    pub number: i32,
    /// UTF-8 text after the `". "` separator, without the line terminator.
    /// Never empty.
    pub text: Vec<u8>,
}

impl Record {
    /// Parse a line (no terminator) of the form `DIGIT+ ". " BYTE+`.
    ///
    /// Returns `None` for anything else: no dot, dot in first position,
    /// missing space, empty text, non-digit or overflowing number, or text
    /// that is not valid UTF-8.
    pub fn try_parse(line: &[u8]) -> Option<Record> {
        let dot = memchr::memchr(b'.', line)?;
        if dot == 0 || line.len() < dot + 3 || line[dot + 1] != b' ' {
            return None;
        }
        let number = parse_number(&line[..dot])?;
        let text = &line[dot + 2..];
        std::str::from_utf8(text).ok()?;
        Some(Record {
            number,
            text: text.to_vec(),
        })
    }

    /// Serialize as `"<number>. <text>\n"`, the canonical form shared by
    /// runs and the final output.
    #[inline]
    pub fn write_line<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "{}. ", self.number)?;
        w.write_all(&self.text)?;
        w.write_all(b"\n")
    }
}

/// Total record order: text by ordinal bytes (shorter-is-smaller on prefix),
/// then number ascending. No locale, no case folding, no normalization.
impl Ord for Record {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.text
            .cmp(&other.text)
            .then_with(|| self.number.cmp(&other.number))
    }
}

impl PartialOrd for Record {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Decimal parse with `NumberStyles.None` semantics: digits only, no sign,
/// no whitespace, no grouping. Overflow past `i32::MAX` rejects.
fn parse_number(digits: &[u8]) -> Option<i32> {
    if digits.is_empty() {
        return None;
    }
    let mut value: i32 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as i32)?;
    }
    Some(value)
}
