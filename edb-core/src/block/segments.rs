//! Nested segment arrays (wiring topology).
//!
//! Same header and sentinel values as record arrays, but a non-sentinel
//! control word is the element's own length in `u32`s, followed by that many
//! integers. Runs operate on whole elements.

use byteorder::{ByteOrder, LittleEndian};

use super::cursor::BlockCursor;
use super::records::HEADER_PADDING;
use super::typed::CountCell;
use super::{
    MAX_RUN, SENTINEL_END, SENTINEL_INCREMENT, SENTINEL_PADDING, SENTINEL_REPEAT, charge, reserve,
};
use crate::error::{EdbError, Result};

/// Bytes one segment costs beyond its integers.
const SEGMENT_OVERHEAD: usize = std::mem::size_of::<Vec<u32>>();

fn segment_cost(len: usize) -> usize {
    SEGMENT_OVERHEAD.saturating_add(len.saturating_mul(4))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SegmentControl {
    /// `count` copies of the previous segment, its last integer +1 each.
    Increment,
    /// `count` copies of the previous segment.
    Repeat,
    /// One discarded `u32`, no segment.
    Padding,
    End,
    Length(u32),
}

impl SegmentControl {
    fn classify(word: u32) -> Self {
        match word {
            SENTINEL_INCREMENT => Self::Increment,
            SENTINEL_REPEAT => Self::Repeat,
            SENTINEL_PADDING => Self::Padding,
            SENTINEL_END => Self::End,
            n => Self::Length(n),
        }
    }
}

/// Decode a segment array. On success the cursor rests on the end sentinel.
pub fn decode_segments(
    cur: &mut BlockCursor<'_>,
    count: &mut CountCell,
) -> Result<Vec<Vec<u32>>> {
    let declared_bytes = cur.read_u32("segment byte count")?;
    cur.skip(HEADER_PADDING, "segment header padding")?;
    let start = cur.position();

    let counted = walk(cur, None)?;
    cur.set_position(start);

    let mut out = Vec::new();
    reserve(&mut out, counted)?;
    walk(cur, Some(&mut out))?;
    tracing::trace!(declared_bytes, segments = out.len(), "segment array");

    count.resolve(out.len())?;
    Ok(out)
}

fn walk(cur: &mut BlockCursor<'_>, mut out: Option<&mut Vec<Vec<u32>>>) -> Result<usize> {
    let mut n = 0usize;
    let mut bytes = 0usize;
    // Counting pass only needs to know whether the previous segment exists
    // and is non-empty.
    let mut prev_len: Option<usize> = None;
    loop {
        let at = cur.position();
        match SegmentControl::classify(cur.read_u32("segment control word")?) {
            SegmentControl::End => {
                cur.rewind(4);
                return Ok(n);
            }
            SegmentControl::Padding => {
                cur.read_u32("segment padding slot")?;
            }
            control @ (SegmentControl::Repeat | SegmentControl::Increment) => {
                let run = cur.read_u32("segment run length")?;
                let Some(len) = prev_len else {
                    return Err(EdbError::Malformed {
                        offset: at,
                        context: "segment run without a previous segment",
                    });
                };
                if run > MAX_RUN {
                    return Err(EdbError::Malformed {
                        offset: at,
                        context: "segment run length out of range",
                    });
                }
                let increment = control == SegmentControl::Increment;
                if increment && len == 0 {
                    return Err(EdbError::Malformed {
                        offset: at,
                        context: "increment run over an empty segment",
                    });
                }
                charge(&mut bytes, run as usize, segment_cost(len), at)?;
                if let Some(segs) = out.as_deref_mut() {
                    for _ in 0..run {
                        let mut next = segs[segs.len() - 1].clone();
                        if increment {
                            let last = next.len() - 1;
                            next[last] = next[last].wrapping_add(1);
                        }
                        segs.push(next);
                    }
                }
                n += run as usize;
            }
            SegmentControl::Length(len) => {
                let len = len as usize;
                let ints = cur.read_bytes(
                    len.checked_mul(4).ok_or(EdbError::Malformed {
                        offset: at,
                        context: "segment length overflow",
                    })?,
                    "segment integers",
                )?;
                charge(&mut bytes, 1, segment_cost(len), at)?;
                if let Some(segs) = out.as_deref_mut() {
                    segs.push(
                        ints
                            .chunks_exact(4)
                            .map(LittleEndian::read_u32)
                            .collect(),
                    );
                }
                prev_len = Some(len);
                n += 1;
            }
        }
    }
}
