//! Variable-length string arrays.
//!
//! Layout: `u32` byte count (unreliable), 16 bytes of padding, then one
//! control byte per slot: a short length, or one of the markers below.

use super::cursor::BlockCursor;
use super::reserve;
use super::typed::CountCell;
use crate::error::Result;

pub const HEADER_PADDING: usize = 16;

pub const MARK_LONG: u8 = 0xFD;
pub const MARK_PADDING: u8 = 0xFE;
pub const MARK_END: u8 = 0xFF;

/// Longest string representable by the one-byte short form.
pub const SHORT_MAX: usize = MARK_LONG as usize - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StringControl {
    /// `u32` length follows.
    Long,
    /// One discarded `u32`, no string.
    Padding,
    End,
    Short(u8),
}

impl StringControl {
    fn classify(b: u8) -> Self {
        match b {
            MARK_LONG => Self::Long,
            MARK_PADDING => Self::Padding,
            MARK_END => Self::End,
            n => Self::Short(n),
        }
    }
}

/// Decode a string array. On success the cursor rests on the `0xFF` end mark.
pub fn decode_strings(cur: &mut BlockCursor<'_>, count: &mut CountCell) -> Result<Vec<Vec<u8>>> {
    let declared_bytes = cur.read_u32("string byte count")?;
    cur.skip(HEADER_PADDING, "string header padding")?;
    let start = cur.position();

    let counted = walk(cur, None)?;
    cur.set_position(start);

    let mut out = Vec::new();
    reserve(&mut out, counted)?;
    walk(cur, Some(&mut out))?;
    tracing::trace!(declared_bytes, strings = out.len(), "string array");

    count.resolve(out.len())?;
    Ok(out)
}

fn walk(cur: &mut BlockCursor<'_>, mut out: Option<&mut Vec<Vec<u8>>>) -> Result<usize> {
    let mut n = 0usize;
    loop {
        let len = match StringControl::classify(cur.read_u8("string control byte")?) {
            StringControl::End => {
                cur.rewind(1);
                return Ok(n);
            }
            StringControl::Padding => {
                cur.read_u32("string padding slot")?;
                continue;
            }
            StringControl::Long => cur.read_u32("long string length")? as usize,
            StringControl::Short(len) => len as usize,
        };
        match out.as_deref_mut() {
            Some(strings) => strings.push(cur.read_bytes(len, "string bytes")?.to_vec()),
            None => cur.skip(len, "string bytes")?,
        }
        n += 1;
    }
}
