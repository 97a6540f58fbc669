use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::ops::Range;

use crate::error::{EdbError, Result};

pub const FRAGMENT_HEADER_LEN: usize = 16;

/// Header of one storage fragment. The payload follows it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub offset: u32,
    pub data_len: u32,
    /// Header, data and trailing padding.
    pub total_len: u32,
    /// How many further entries share this fragment. A hint only.
    pub duplicates: u32,
    pub next: u32,
}

impl Fragment {
    pub fn read_at(buf: &[u8], offset: u32) -> Result<Self> {
        let at = offset as usize;
        let mut r = at
            .checked_add(FRAGMENT_HEADER_LEN)
            .and_then(|end| buf.get(at..end))
            .ok_or_else(|| {
                EdbError::Format(format!(
                    "fragment header at {offset:#x} runs past end of archive"
                ))
            })?;
        Ok(Self {
            offset,
            data_len: r.read_u32::<LittleEndian>()?,
            total_len: r.read_u32::<LittleEndian>()?,
            duplicates: r.read_u32::<LittleEndian>()?,
            next: r.read_u32::<LittleEndian>()?,
        })
    }

    pub fn payload_range(&self) -> Range<usize> {
        let start = self.offset as usize + FRAGMENT_HEADER_LEN;
        start..start + self.data_len as usize
    }

    /// Payload bytes, or `None` when they do not fit in `buf`.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> Option<&'a [u8]> {
        buf.get(self.payload_range())
    }

    pub fn is_consistent(&self) -> bool {
        u64::from(self.total_len) >= FRAGMENT_HEADER_LEN as u64 + u64::from(self.data_len)
    }
}

/// First entry, in table order, whose chain consumes each fragment.
#[derive(Debug, Default)]
pub struct FragmentLedger {
    owners: HashMap<u32, usize>,
}

impl FragmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute `offset` to `entry` unless an entry already claimed it.
    /// Returns the owning entry.
    pub fn claim(&mut self, offset: u32, entry: usize) -> usize {
        *self.owners.entry(offset).or_insert(entry)
    }

    pub fn owner(&self, offset: u32) -> Option<usize> {
        self.owners.get(&offset).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
