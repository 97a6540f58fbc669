//! Walks the `(key, tag, payload)` block sequence of one member file.
//!
//! The byte count at the head of each payload does not reliably mark where
//! the block ends. The walker instead scans for the terminator after the
//! callback has consumed what it understood: a single `0xFF` for
//! byte-oriented blocks, the word `0x4FFF_FFFF` for everything else.

use byteorder::{ByteOrder, LittleEndian};
use std::borrow::Cow;

use super::SENTINEL_END;
use super::cursor::BlockCursor;
use super::strings::MARK_END;
use super::typed::BlockType;
use crate::diag::{DiagnosticKind, Diagnostics};
use crate::error::Result;

/// Key length marking the end of the block stream.
pub const KEY_LEN_SENTINEL: u32 = 0xFFFF_FFFF;

#[derive(Clone, Debug)]
pub struct BlockHeader<'a> {
    pub key: Cow<'a, str>,
    pub tag: u32,
    /// Offset of the key-length word.
    pub offset: usize,
}

#[derive(Debug, Default)]
pub struct StreamSummary {
    pub blocks: usize,
    /// Offset where the walk stopped.
    pub end: usize,
    pub diagnostics: Diagnostics,
}

/// Call `on_key` once per block with a cursor positioned right after the tag,
/// then skip to the next block.
///
/// An error returned by `on_key` is recorded against that block and the walk
/// continues.
pub fn walk_blocks<'a, F>(buf: &'a [u8], mut on_key: F) -> StreamSummary
where
    F: FnMut(&BlockHeader<'a>, &mut BlockCursor<'a>) -> Result<()>,
{
    let mut cur = BlockCursor::new(buf);
    let mut summary = StreamSummary::default();

    while cur.remaining() >= 4 {
        let offset = cur.position();
        let Ok(key_len) = cur.read_u32("key length") else {
            break;
        };
        if key_len == 0 || key_len == KEY_LEN_SENTINEL {
            tracing::debug!(offset, key_len, "block stream end marker");
            cur.set_position(offset);
            break;
        }
        let header = match read_header(&mut cur, key_len, offset) {
            Ok(h) => h,
            Err(e) => {
                summary.diagnostics.push(
                    DiagnosticKind::Structural,
                    format!("block header at {offset:#x}: {e}"),
                );
                break;
            }
        };
        let payload_at = cur.position();

        let mut payload = cur.clone();
        if let Err(e) = on_key(&header, &mut payload) {
            summary
                .diagnostics
                .push(e.diagnostic_kind(), format!("block {:?}: {e}", header.key));
        }
        summary.blocks += 1;

        cur.set_position(payload.position().max(payload_at));
        let found = if BlockType::is_byte_oriented(header.tag) {
            scan_byte(&mut cur)
        } else {
            scan_word(&mut cur)
        };
        if !found {
            summary.diagnostics.structural(format!(
                "block {:?} at {offset:#x}: no terminator before end of buffer",
                header.key
            ));
            break;
        }
    }

    summary.end = cur.position();
    summary
}

fn read_header<'a>(
    cur: &mut BlockCursor<'a>,
    key_len: u32,
    offset: usize,
) -> Result<BlockHeader<'a>> {
    let key = String::from_utf8_lossy(cur.read_bytes(key_len as usize, "key name")?);
    let tag = cur.read_u32("type tag")?;
    Ok(BlockHeader { key, tag, offset })
}

/// Advance past the next `0xFF`. Returns false (cursor at end) if none.
fn scan_byte(cur: &mut BlockCursor<'_>) -> bool {
    match cur.rest().iter().position(|&b| b == MARK_END) {
        Some(i) => {
            cur.advance(i + 1);
            true
        }
        None => {
            cur.advance(cur.remaining());
            false
        }
    }
}

/// Shift bytes one at a time into a little-endian window and advance past the
/// first window equal to the end sentinel.
fn scan_word(cur: &mut BlockCursor<'_>) -> bool {
    let rest = cur.rest();
    if rest.len() < 4 {
        cur.advance(rest.len());
        return false;
    }
    let mut window = LittleEndian::read_u32(&rest[..4]);
    let mut i = 4;
    loop {
        if window == SENTINEL_END {
            cur.advance(i);
            return true;
        }
        if i == rest.len() {
            cur.advance(i);
            return false;
        }
        window = (window >> 8) | (u32::from(rest[i]) << 24);
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::testutil::{Payload, block};
    use crate::block::typed::{TAG_SEGMENTS, TAG_STRINGS};
    use crate::block::SENTINEL_REPEAT;
    use crate::error::EdbError;

    fn keys_of(buf: &[u8]) -> (Vec<String>, StreamSummary) {
        let mut keys = Vec::new();
        let summary = walk_blocks(buf, |h, _| {
            keys.push(h.key.to_string());
            Ok(())
        });
        (keys, summary)
    }

    #[test]
    fn skips_blocks_the_callback_ignores() {
        let mut buf = block(
            "A",
            BlockType::records(4).tag(),
            &Payload::records().words(&[1, SENTINEL_REPEAT, 2]).word(SENTINEL_END).finish(),
        );
        buf.extend(block(
            "B",
            TAG_STRINGS,
            &Payload::strings().short_str(b"xy").byte(0xFF).finish(),
        ));
        buf.extend(block(
            "C",
            TAG_SEGMENTS,
            &Payload::segments().words(&[1, 9]).word(SENTINEL_END).finish(),
        ));
        buf.extend_from_slice(&0u32.to_le_bytes());

        let (keys, summary) = keys_of(&buf);
        assert_eq!(keys, ["A", "B", "C"]);
        assert_eq!(summary.blocks, 3);
        assert!(summary.diagnostics.is_empty());
        assert_eq!(summary.end, buf.len() - 4);
    }

    #[test]
    fn stops_on_all_ones_key_length() {
        let mut buf = block(
            "K",
            BlockType::records(4).tag(),
            &Payload::records().word(SENTINEL_END).finish(),
        );
        buf.extend_from_slice(&KEY_LEN_SENTINEL.to_le_bytes());
        buf.extend(block("never", TAG_STRINGS, &[0xFF]));
        let (keys, _) = keys_of(&buf);
        assert_eq!(keys, ["K"]);
    }

    #[test]
    fn word_terminator_found_at_unaligned_offset() {
        let mut payload = vec![0u8, 0, 0];
        payload.extend_from_slice(&SENTINEL_END.to_le_bytes());
        let mut buf = block("odd", BlockType::records(4).tag(), &payload);
        buf.extend(block("next", TAG_STRINGS, &[0xFF]));
        let (keys, summary) = keys_of(&buf);
        assert_eq!(keys, ["odd", "next"]);
        assert!(summary.diagnostics.is_empty());
    }

    #[test]
    fn callback_error_is_recorded_and_walk_continues() {
        let mut buf = block("bad", TAG_STRINGS, &Payload::strings().byte(0xFF).finish());
        buf.extend(block("good", TAG_STRINGS, &Payload::strings().byte(0xFF).finish()));
        let mut seen = Vec::new();
        let summary = walk_blocks(&buf, |h, _| {
            seen.push(h.key.to_string());
            if h.key == "bad" {
                return Err(EdbError::CountMismatch { expected: 1, found: 0 });
            }
            Ok(())
        });
        assert_eq!(seen, ["bad", "good"]);
        assert_eq!(summary.diagnostics.count(DiagnosticKind::CountMismatch), 1);
    }

    #[test]
    fn missing_terminator_is_reported() {
        let buf = block("open", BlockType::records(4).tag(), &[1, 2, 3, 4, 5, 6]);
        let (keys, summary) = keys_of(&buf);
        assert_eq!(keys, ["open"]);
        assert_eq!(summary.diagnostics.count(DiagnosticKind::Structural), 1);
        assert_eq!(summary.end, buf.len());
    }

    #[test]
    fn truncated_key_is_reported() {
        let mut buf = 50u32.to_le_bytes().to_vec();
        buf.extend_from_slice(b"short");
        let (keys, summary) = keys_of(&buf);
        assert!(keys.is_empty());
        assert_eq!(summary.diagnostics.count(DiagnosticKind::Structural), 1);
    }
}
