//! Keyed block streams inside extracted member files.
//!
//! A member file is a sequence of `(key, type tag, payload)` blocks. Payloads
//! use reserved sentinel words in the `0x4FFF_FFFx` range for run-length
//! encoding; the same numeric values are shared by record and segment
//! payloads, but each shape classifies them through its own control enum.

pub mod cursor;
pub mod records;
pub mod segments;
pub mod stream;
pub mod strings;
pub mod typed;

use crate::error::{EdbError, Result};
use cursor::BlockCursor;
use typed::{BlockType, CountCell, TypedArray};

pub const SENTINEL_INCREMENT: u32 = 0x4FFF_FFFC;
pub const SENTINEL_REPEAT: u32 = 0x4FFF_FFFD;
pub const SENTINEL_PADDING: u32 = 0x4FFF_FFFE;
pub const SENTINEL_END: u32 = 0x4FFF_FFFF;

/// Upper bound on a single repeat/increment run.
pub(crate) const MAX_RUN: u32 = 1 << 24;

/// Upper bound on the materialized size of one payload.
pub const MAX_DECODED_BYTES: usize = 256 << 20;

/// Charge `elements` more elements of `elem_bytes` each to a payload's
/// running total, failing once it passes [`MAX_DECODED_BYTES`].
pub(crate) fn charge(
    total: &mut usize,
    elements: usize,
    elem_bytes: usize,
    offset: usize,
) -> Result<()> {
    match elements
        .checked_mul(elem_bytes)
        .and_then(|b| total.checked_add(b))
    {
        Some(t) if t <= MAX_DECODED_BYTES => {
            *total = t;
            Ok(())
        }
        _ => Err(EdbError::Oversized {
            offset,
            limit: MAX_DECODED_BYTES,
        }),
    }
}

/// Reserve room for `additional` elements without aborting on failure.
pub(crate) fn reserve<T>(v: &mut Vec<T>, additional: usize) -> Result<()> {
    v.try_reserve_exact(additional).map_err(|_| EdbError::Alloc {
        bytes: additional.saturating_mul(std::mem::size_of::<T>()),
    })
}

/// Decode a payload the caller expects to be of shape `expected`.
///
/// `actual_tag` is the tag read from the block header; a mismatch fails this
/// block only and leaves the cursor untouched.
pub fn decode_payload(
    cur: &mut BlockCursor<'_>,
    actual_tag: u32,
    expected: BlockType,
    count: &mut CountCell,
) -> Result<TypedArray> {
    if actual_tag != expected.tag() {
        return Err(EdbError::TypeMismatch {
            expected,
            actual: actual_tag,
        });
    }
    decode_as(cur, expected, count)
}

/// Decode a payload according to its own tag. Unknown tags yield `None`.
pub fn decode_by_tag(
    cur: &mut BlockCursor<'_>,
    tag: u32,
    count: &mut CountCell,
) -> Result<Option<TypedArray>> {
    match BlockType::from_tag(tag) {
        Some(ty) => decode_as(cur, ty, count).map(Some),
        None => Ok(None),
    }
}

fn decode_as(
    cur: &mut BlockCursor<'_>,
    ty: BlockType,
    count: &mut CountCell,
) -> Result<TypedArray> {
    Ok(match ty {
        BlockType::Records { size } => {
            TypedArray::Records(records::decode_records(cur, size as usize, count)?)
        }
        BlockType::Strings => TypedArray::Strings(strings::decode_strings(cur, count)?),
        BlockType::Segments => TypedArray::Segments(segments::decode_segments(cur, count)?),
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Payload builders for unit tests.

    use byteorder::{LittleEndian, WriteBytesExt};

    use super::records;
    use super::strings;

    pub struct Payload(Vec<u8>);

    impl Payload {
        fn with_padding(pad: usize) -> Self {
            Self(vec![0u8; 4 + pad])
        }

        pub fn records() -> Self {
            Self::with_padding(records::HEADER_PADDING)
        }

        pub fn segments() -> Self {
            Self::with_padding(records::HEADER_PADDING)
        }

        pub fn strings() -> Self {
            Self::with_padding(strings::HEADER_PADDING)
        }

        pub fn word(mut self, v: u32) -> Self {
            self.0.write_u32::<LittleEndian>(v).unwrap();
            self
        }

        pub fn words(self, vs: &[u32]) -> Self {
            vs.iter().fold(self, |p, v| p.word(*v))
        }

        pub fn byte(mut self, b: u8) -> Self {
            self.0.push(b);
            self
        }

        pub fn short_str(mut self, s: &[u8]) -> Self {
            assert!(s.len() <= strings::SHORT_MAX);
            self.0.push(s.len() as u8);
            self.0.extend_from_slice(s);
            self
        }

        pub fn long_str(mut self, s: &[u8]) -> Self {
            self.0.push(strings::MARK_LONG);
            self.0.write_u32::<LittleEndian>(s.len() as u32).unwrap();
            self.0.extend_from_slice(s);
            self
        }

        pub fn finish(mut self) -> Vec<u8> {
            let n = (self.0.len() - 4) as u32;
            self.0[..4].copy_from_slice(&n.to_le_bytes());
            self.0
        }
    }

    /// Block header followed by `payload`.
    pub fn block(key: &str, tag: u32, payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.write_u32::<LittleEndian>(key.len() as u32).unwrap();
        v.extend_from_slice(key.as_bytes());
        v.write_u32::<LittleEndian>(tag).unwrap();
        v.extend_from_slice(payload);
        v
    }
}
