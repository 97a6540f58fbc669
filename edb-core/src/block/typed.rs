//! Decoded payload containers.
//!
//! A block's type tag is interpreted exactly once, here, into a [`BlockType`];
//! the decoded data is held in a [`TypedArray`] variant that consumers match
//! on instead of reinterpreting bytes.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use std::fmt;

use crate::error::{EdbError, Result};

pub const TAG_RECORDS: u32 = 0x0100_0000;
pub const TAG_STRINGS: u32 = 0x0200_0000;
pub const TAG_SEGMENTS: u32 = 0x0300_0000;

const SHAPE_MASK: u32 = 0xFF00_0000;
const SIZE_MASK: u32 = 0x0000_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum BlockType {
    /// Fixed-size records of `size` bytes (nonzero, multiple of 4).
    Records { size: u32 },
    /// Length-prefixed strings; the only byte-oriented payload.
    Strings,
    /// Variable-length lists of `u32`.
    Segments,
}

impl BlockType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag & SHAPE_MASK {
            TAG_RECORDS => {
                if tag & !(SHAPE_MASK | SIZE_MASK) != 0 {
                    return None;
                }
                let size = tag & SIZE_MASK;
                (size != 0 && size % 4 == 0).then_some(Self::Records { size })
            }
            TAG_STRINGS if tag == TAG_STRINGS => Some(Self::Strings),
            TAG_SEGMENTS if tag == TAG_SEGMENTS => Some(Self::Segments),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            Self::Records { size } => TAG_RECORDS | (size & SIZE_MASK),
            Self::Strings => TAG_STRINGS,
            Self::Segments => TAG_SEGMENTS,
        }
    }

    pub fn records(size: u32) -> Self {
        Self::Records { size }
    }

    /// Byte-oriented blocks end on a single `0xFF`; all others on a 4-byte
    /// terminator word.
    pub fn is_byte_oriented(tag: u32) -> bool {
        tag == TAG_STRINGS
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Records { size } => write!(f, "records[{size}]"),
            Self::Strings => f.write_str("strings"),
            Self::Segments => f.write_str("segments"),
        }
    }
}

/// Declared element count shared by the consumers of parallel arrays.
///
/// The first decode against an unconstrained cell fixes the count; every later
/// decode against the same cell must produce exactly that many elements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CountCell {
    #[default]
    Unconstrained,
    Exactly(usize),
}

impl CountCell {
    pub fn resolve(&mut self, computed: usize) -> Result<usize> {
        match *self {
            Self::Unconstrained => {
                *self = Self::Exactly(computed);
                Ok(computed)
            }
            Self::Exactly(expected) if expected == computed => Ok(computed),
            Self::Exactly(expected) => Err(EdbError::CountMismatch {
                expected,
                found: computed,
            }),
        }
    }

    pub fn expected(&self) -> Option<usize> {
        match self {
            Self::Unconstrained => None,
            Self::Exactly(n) => Some(*n),
        }
    }
}

/// Flat storage for fixed-size records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordArray {
    size: usize,
    data: Vec<u8>,
}

impl RecordArray {
    pub(crate) fn from_parts(size: usize, data: Vec<u8>) -> Self {
        debug_assert!(size > 0 && data.len() % size == 0);
        Self { size, data }
    }

    pub fn record_size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Record<'_>> {
        let start = index.checked_mul(self.size)?;
        self.data.get(start..start + self.size).map(Record)
    }

    pub fn iter(&self) -> impl Iterator<Item = Record<'_>> {
        self.data.chunks_exact(self.size).map(Record)
    }

    /// Field `field` (in 4-byte units) of every record, as `u32`.
    pub fn column_u32(&self, field: usize) -> Vec<u32> {
        self.iter().map(|r| r.u32(field)).collect()
    }
}

/// Borrowed view of one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record<'a>(&'a [u8]);

impl<'a> Record<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }

    /// 4-byte field `field`; fields past the record end read as 0.
    pub fn u32(&self, field: usize) -> u32 {
        let at = field * 4;
        self.0
            .get(at..at + 4)
            .map(LittleEndian::read_u32)
            .unwrap_or(0)
    }

    pub fn i32(&self, field: usize) -> i32 {
        self.u32(field) as i32
    }

    pub fn last_u32(&self) -> u32 {
        LittleEndian::read_u32(&self.0[self.0.len() - 4..])
    }
}

/// Decoded payload of one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypedArray {
    Records(RecordArray),
    Strings(Vec<Vec<u8>>),
    Segments(Vec<Vec<u32>>),
}

impl TypedArray {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Records(r) => BlockType::Records {
                size: r.record_size() as u32,
            },
            Self::Strings(_) => BlockType::Strings,
            Self::Segments(_) => BlockType::Segments,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Records(r) => r.len(),
            Self::Strings(s) => s.len(),
            Self::Segments(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_records(&self) -> Option<&RecordArray> {
        match self {
            Self::Records(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[Vec<u8>]> {
        match self {
            Self::Strings(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_segments(&self) -> Option<&[Vec<u32>]> {
        match self {
            Self::Segments(s) => Some(s),
            _ => None,
        }
    }
}

/// Vendor strings are mostly ASCII; anything else is replaced.
pub fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip_and_rejects() {
        for t in [
            BlockType::records(4),
            BlockType::records(16),
            BlockType::Strings,
            BlockType::Segments,
        ] {
            assert_eq!(BlockType::from_tag(t.tag()), Some(t));
        }
        assert_eq!(BlockType::from_tag(TAG_RECORDS), None);
        assert_eq!(BlockType::from_tag(TAG_RECORDS | 6), None);
        assert_eq!(BlockType::from_tag(TAG_STRINGS | 1), None);
        assert_eq!(BlockType::from_tag(0x0900_0000), None);
        assert!(BlockType::is_byte_oriented(TAG_STRINGS));
        assert!(!BlockType::is_byte_oriented(TAG_SEGMENTS));
    }

    #[test]
    fn count_cell_adopts_then_enforces() {
        let mut cell = CountCell::Unconstrained;
        assert_eq!(cell.resolve(3).unwrap(), 3);
        assert_eq!(cell.expected(), Some(3));
        assert_eq!(cell.resolve(3).unwrap(), 3);
        let err = cell.resolve(4).unwrap_err();
        assert!(matches!(err, EdbError::CountMismatch { expected: 3, found: 4 }));
    }

    #[test]
    fn record_fields() {
        let mut data = Vec::new();
        for v in [1u32, 2, 3, 0xFFFF_FFFF] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let arr = RecordArray::from_parts(8, data);
        assert_eq!(arr.len(), 2);
        let r = arr.get(1).unwrap();
        assert_eq!(r.u32(0), 3);
        assert_eq!(r.i32(1), -1);
        assert_eq!(r.last_u32(), 0xFFFF_FFFF);
        assert_eq!(r.u32(9), 0);
        assert!(arr.get(2).is_none());
        assert_eq!(arr.column_u32(0), vec![1, 3]);
    }
}
