use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;

use super::header::{DatabaseHeader, GUID_LEN, Guid};
use crate::diag::{DiagnosticKind, Diagnostics};
use crate::error::{EdbError, Result};

/// Reserved value every file-list node starts with.
pub const LIST_MARKER: u32 = 0x0000_A55A;
pub const ENTRIES_PER_LIST: usize = 100;
pub const LIST_HEADER_LEN: usize = 24;
pub const NAME_FIELD_LEN: usize = 160;
pub const ENTRY_SIZE: usize = 208;
pub const LIST_BLOCK_LEN: usize = LIST_HEADER_LEN + ENTRIES_PER_LIST * ENTRY_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileListBlock {
    pub offset: u32,
    pub marker: u32,
    pub count: u32,
    pub count_check: u32,
    pub next_file_list: u32,
    pub reserved: [u32; 2],
}

impl FileListBlock {
    pub fn read_at(buf: &[u8], offset: u32) -> Result<Self> {
        let mut r = slice_at(buf, offset as usize, LIST_HEADER_LEN, "file list header")?;
        Ok(Self {
            offset,
            marker: r.read_u32::<LittleEndian>()?,
            count: r.read_u32::<LittleEndian>()?,
            count_check: r.read_u32::<LittleEndian>()?,
            next_file_list: r.read_u32::<LittleEndian>()?,
            reserved: [r.read_u32::<LittleEndian>()?, r.read_u32::<LittleEndian>()?],
        })
    }

    pub fn entry_offset(&self, slot: usize) -> usize {
        self.offset as usize + LIST_HEADER_LEN + slot * ENTRY_SIZE
    }
}

/// One logical member file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Position of this entry in the archive, as stored.
    pub start: u32,
    pub name: String,
    pub guid: Guid,
    pub data_size: u32,
    /// Offset of the first fragment. Entries sharing it share content.
    pub data_address: u32,
    pub padding: u32,
}

impl FileEntry {
    pub fn read_at(buf: &[u8], offset: usize, diags: &mut Diagnostics) -> Result<Self> {
        let mut r = slice_at(buf, offset, ENTRY_SIZE, "file entry")?;
        let start = r.read_u32::<LittleEndian>()?;
        let name_len = r.read_u32::<LittleEndian>()?;
        let mut name_field = [0u8; NAME_FIELD_LEN];
        r.read_exact(&mut name_field)?;
        let mut guid = [0u8; GUID_LEN];
        r.read_exact(&mut guid)?;
        let data_size = r.read_u32::<LittleEndian>()?;
        let data_address = r.read_u32::<LittleEndian>()?;
        let padding = r.read_u32::<LittleEndian>()?;
        let reserved = r.read_u32::<LittleEndian>()?;

        if start as usize != offset {
            diags.structural(format!(
                "file entry at {offset:#x} records its start as {start:#x}"
            ));
        }
        let mut len = name_len as usize;
        if len > NAME_FIELD_LEN {
            diags.structural(format!(
                "file entry at {offset:#x}: name length {name_len} exceeds {NAME_FIELD_LEN}"
            ));
            len = NAME_FIELD_LEN;
        }
        // The stored name is not guaranteed to carry a terminator, nor to be
        // free of one.
        let raw = &name_field[..len];
        let raw = raw.split(|&b| b == 0).next().unwrap_or(raw);
        if reserved != 0 {
            diags.push(
                DiagnosticKind::Warning,
                format!("file entry at {offset:#x}: reserved field is {reserved:#x}"),
            );
        }

        Ok(Self {
            start,
            name: String::from_utf8_lossy(raw).into_owned(),
            guid: Guid(guid),
            data_size,
            data_address,
            padding,
        })
    }
}

/// Walk the file-list chain and collect every entry in table order.
///
/// A node that cannot be trusted ends the walk; entries already read are
/// kept.
pub fn read_file_table(
    buf: &[u8],
    header: &DatabaseHeader,
    diags: &mut Diagnostics,
) -> Vec<FileEntry> {
    let mut entries = Vec::with_capacity((header.num_files as usize).min(buf.len() / ENTRY_SIZE));
    let mut visited = HashSet::new();
    let mut lists = 0u32;
    let mut next = header.first_list;

    while next != 0 {
        if !visited.insert(next) {
            diags.structural(format!("file list chain revisits {next:#x}"));
            break;
        }
        let node = match FileListBlock::read_at(buf, next) {
            Ok(n) => n,
            Err(e) => {
                diags.structural(format!("file list at {next:#x}: {e}"));
                break;
            }
        };
        lists += 1;
        if node.marker != LIST_MARKER {
            diags.structural(format!(
                "file list at {next:#x}: marker {:#x}, expected {LIST_MARKER:#x}",
                node.marker
            ));
            break;
        }
        if node.count != node.count_check {
            diags.structural(format!(
                "file list at {next:#x}: counts disagree ({} vs {})",
                node.count, node.count_check
            ));
        }
        let count = node.count.min(node.count_check) as usize;
        if count > ENTRIES_PER_LIST {
            diags.structural(format!(
                "file list at {next:#x}: {count} entries exceeds {ENTRIES_PER_LIST}"
            ));
            break;
        }
        if node.reserved != [0, 0] {
            diags.push(
                DiagnosticKind::Warning,
                format!(
                    "file list at {next:#x}: reserved fields {:#x?}",
                    node.reserved
                ),
            );
        }

        for slot in 0..count {
            let at = node.entry_offset(slot);
            match FileEntry::read_at(buf, at, diags) {
                Ok(e) => {
                    tracing::debug!(
                        name = %e.name,
                        size = e.data_size,
                        address = format_args!("{:#x}", e.data_address),
                        "file entry"
                    );
                    entries.push(e);
                }
                Err(e) => {
                    diags.structural(format!("file entry at {at:#x}: {e}"));
                    break;
                }
            }
        }
        next = node.next_file_list;
    }

    if entries.len() != header.num_files as usize {
        diags.structural(format!(
            "file table holds {} entries, header declares {}",
            entries.len(),
            header.num_files
        ));
    }
    if lists != header.num_lists {
        diags.structural(format!(
            "file table has {lists} list nodes, header declares {}",
            header.num_lists
        ));
    }
    entries
}

fn slice_at<'a>(buf: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| {
            EdbError::Format(format!(
                "{what} at {offset:#x} runs past end of archive ({} bytes)",
                buf.len()
            ))
        })
}
