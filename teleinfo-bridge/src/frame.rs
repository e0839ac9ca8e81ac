//! Teleinfo frame parsing
//!
//! Each serial line carries one `KEY VALUE CHECKSUM` group. Groups are
//! validated against a modulo-64 checksum and folded into a snapshot map
//! until the `MOTDETAT` sentinel closes the frame.

use serde::Serialize;
use std::collections::HashMap;

/// Key whose appearance (checksum-validated) marks the end of a frame.
/// It is discarded, never stored into the snapshot.
pub const FRAME_END_KEY: &str = "MOTDETAT";

/// Aggregated meter fields awaiting publish.
pub type Snapshot = HashMap<String, FieldValue>;

/// A meter field value. All-digit values are stored as integers so the
/// published JSON carries numbers; everything else stays a string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(u64),
    Text(String),
}

impl FieldValue {
    /// Lossy by contract: `"007"` becomes `7`, leading zeros and formatting
    /// are dropped. Digit runs too long for u64 stay strings.
    fn parse(raw: &str) -> FieldValue {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<u64>() {
                return FieldValue::Integer(n);
            }
        }
        FieldValue::Text(raw.to_string())
    }
}

/// Verify a `(key, value, checksum)` group against the Teleinfo checksum:
/// the sum of the ASCII bytes of `"KEY VALUE"`, masked to 6 bits, offset
/// into the printable range.
///
/// An empty checksum token means the checksum byte was itself a space
/// (line splitting yields `""` for it).
pub fn verify_checksum(key: &str, value: &str, checksum: &str) -> bool {
    let checksum = if checksum.is_empty() { " " } else { checksum };
    let mut chars = checksum.chars();
    let (Some(received), None) = (chars.next(), chars.next()) else {
        return false;
    };
    let sum: u32 = key
        .bytes()
        .chain([b' '])
        .chain(value.bytes())
        .map(u32::from)
        .sum();
    let expected = (((sum & 0x3F) + 0x20) as u8) as char;
    received == expected
}

/// Folds validated groups into the in-progress snapshot.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    fields: Snapshot,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one raw serial line (terminators already stripped).
    ///
    /// Returns `true` when the line is the frame-end sentinel. Malformed
    /// lines (under 3 tokens, checksum mismatch) are dropped silently.
    pub fn apply_line(&mut self, line: &str) -> bool {
        let mut tokens = line.split(' ');
        let (Some(key), Some(value), Some(checksum)) =
            (tokens.next(), tokens.next(), tokens.next())
        else {
            return false;
        };
        if !verify_checksum(key, value, checksum) {
            return false;
        }
        if key == FRAME_END_KEY {
            return true;
        }
        self.fields.insert(key.to_string(), FieldValue::parse(value));
        false
    }

    pub fn fields(&self) -> &Snapshot {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Swap the accumulated snapshot out, leaving the accumulator empty.
    pub fn take(&mut self) -> Snapshot {
        std::mem::take(&mut self.fields)
    }
}
