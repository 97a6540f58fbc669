//! Fixed-size record arrays.
//!
//! Layout: `u32` byte count (unreliable), 20 bytes of padding, then an element
//! stream. Each element starts with a control word: one of the sentinels
//! below, or the first field of a literal record.

use byteorder::{ByteOrder, LittleEndian};

use super::cursor::BlockCursor;
use super::typed::{CountCell, RecordArray};
use super::{
    MAX_RUN, SENTINEL_END, SENTINEL_INCREMENT, SENTINEL_PADDING, SENTINEL_REPEAT, charge, reserve,
};
use crate::error::{EdbError, Result};

pub const HEADER_PADDING: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordControl {
    /// `count` copies of the previous record, last field +1 each.
    Increment,
    /// `count` byte-identical copies of the previous record.
    Repeat,
    /// One discarded `u32`, no record.
    Padding,
    End,
    Literal,
}

impl RecordControl {
    fn classify(word: u32) -> Self {
        match word {
            SENTINEL_INCREMENT => Self::Increment,
            SENTINEL_REPEAT => Self::Repeat,
            SENTINEL_PADDING => Self::Padding,
            SENTINEL_END => Self::End,
            _ => Self::Literal,
        }
    }
}

/// Decode a record array whose elements are `size` bytes long.
///
/// The element stream is walked twice: once to count, once to materialize.
/// On success the cursor rests on the end sentinel.
pub fn decode_records(
    cur: &mut BlockCursor<'_>,
    size: usize,
    count: &mut CountCell,
) -> Result<RecordArray> {
    let declared_bytes = cur.read_u32("record byte count")?;
    cur.skip(HEADER_PADDING, "record header padding")?;
    let start = cur.position();

    let counted = walk(cur, size, None)?;
    let end = cur.position();
    cur.set_position(start);

    // The counting pass already held `counted * size` under the decode limit.
    let mut data = Vec::new();
    reserve(&mut data, counted * size)?;
    let produced = walk(cur, size, Some(&mut data))?;
    if produced != counted || cur.position() != end {
        return Err(EdbError::Malformed {
            offset: start,
            context: "record passes disagree",
        });
    }
    tracing::trace!(
        declared_bytes,
        consumed = end - start,
        produced,
        "record array"
    );

    count.resolve(produced)?;
    Ok(RecordArray::from_parts(size, data))
}

fn walk(cur: &mut BlockCursor<'_>, size: usize, mut out: Option<&mut Vec<u8>>) -> Result<usize> {
    let mut n = 0usize;
    let mut bytes = 0usize;
    loop {
        let at = cur.position();
        let word = cur.read_u32("record control word")?;
        match RecordControl::classify(word) {
            RecordControl::End => {
                cur.rewind(4);
                return Ok(n);
            }
            RecordControl::Padding => {
                cur.read_u32("record padding slot")?;
            }
            control @ (RecordControl::Repeat | RecordControl::Increment) => {
                let run = cur.read_u32("record run length")?;
                if n == 0 {
                    return Err(EdbError::Malformed {
                        offset: at,
                        context: "record run without a previous record",
                    });
                }
                if run > MAX_RUN {
                    return Err(EdbError::Malformed {
                        offset: at,
                        context: "record run length out of range",
                    });
                }
                charge(&mut bytes, run as usize, size, at)?;
                if let Some(buf) = out.as_deref_mut() {
                    for _ in 0..run {
                        let prev = buf.len() - size;
                        buf.extend_from_within(prev..);
                        if control == RecordControl::Increment {
                            let last = buf.len() - 4;
                            let bumped = LittleEndian::read_u32(&buf[last..]).wrapping_add(1);
                            LittleEndian::write_u32(&mut buf[last..], bumped);
                        }
                    }
                }
                n += run as usize;
            }
            RecordControl::Literal => {
                cur.rewind(4);
                let rec = cur.read_bytes(size, "record")?;
                charge(&mut bytes, 1, size, at)?;
                if let Some(buf) = out.as_deref_mut() {
                    buf.extend_from_slice(rec);
                }
                n += 1;
            }
        }
    }
}
