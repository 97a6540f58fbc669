use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{CodecId, inflate_member};
use crate::container::filetab::{FileEntry, read_file_table};
use crate::container::fragment::{Fragment, FragmentLedger};
use crate::container::header::DatabaseHeader;
use crate::diag::{DiagnosticKind, Diagnostics};
use crate::error::{EdbError, Result};

/// An opened database archive held in memory.
///
/// Fragments may sit anywhere in the file, so the whole image is read up
/// front and every structure is addressed by offset.
pub struct Archive {
    path: PathBuf,
    bytes: Vec<u8>,
    pub header: DatabaseHeader,
    pub entries: Vec<FileEntry>,
    /// Problems found while reading the header and file table.
    pub diagnostics: Diagnostics,
    dup_of: Vec<Option<usize>>,
    ledger: FragmentLedger,
}

/// One member file read out of the archive.
#[derive(Debug)]
pub struct Member {
    pub index: usize,
    pub name: String,
    pub stored_len: usize,
    pub codec: CodecId,
    pub inflated: bool,
    pub bytes: Vec<u8>,
    pub diagnostics: Diagnostics,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let mut archive = Self::from_bytes(bytes)?;
        archive.path = path.to_path_buf();
        Ok(archive)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut diagnostics = Diagnostics::new();
        let header = DatabaseHeader::read_from(&bytes, &mut diagnostics)?;
        let entries = read_file_table(&bytes, &header, &mut diagnostics);

        let mut first_at: HashMap<u32, usize> = HashMap::new();
        let dup_of = entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                if e.data_address == 0 {
                    return None;
                }
                match first_at.get(&e.data_address) {
                    Some(&j) => Some(j),
                    None => {
                        first_at.insert(e.data_address, i);
                        None
                    }
                }
            })
            .collect();

        let ledger = claim_chains(&bytes, &entries);
        tracing::debug!(
            entries = entries.len(),
            fragments = ledger.len(),
            bytes = bytes.len(),
            "archive opened"
        );
        Ok(Self {
            path: PathBuf::new(),
            bytes,
            header,
            entries,
            diagnostics,
            dup_of,
            ledger,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, i: usize) -> Result<&FileEntry> {
        self.entries
            .get(i)
            .ok_or_else(|| EdbError::Format(format!("no file entry {i}")))
    }

    /// Earliest earlier entry whose content starts at the same fragment.
    pub fn duplicate_of(&self, i: usize) -> Option<usize> {
        self.dup_of.get(i).copied().flatten()
    }

    pub fn ledger(&self) -> &FragmentLedger {
        &self.ledger
    }

    /// Reassemble the stored bytes of entry `i` from its fragment chain.
    ///
    /// Chain faults are recorded in `diags`; whatever was collected before
    /// the fault is returned.
    pub fn read_payload(&self, i: usize, diags: &mut Diagnostics) -> Result<Vec<u8>> {
        let entry = self.entry(i)?;
        let name = entry.name.clone();
        let want = entry.data_size as usize;
        let is_duplicate = self.duplicate_of(i).is_some();
        let sharers = self.header.num_files.max(self.entries.len() as u32);

        let mut out = Vec::with_capacity(want.min(self.bytes.len()));
        let mut visited = HashSet::new();
        let mut next = entry.data_address;
        let mut trailing = 0u32;
        let mut first = true;

        while next != 0 {
            if out.len() == want {
                trailing = next;
                break;
            }
            if !visited.insert(next) {
                diags.structural(format!("{name}: fragment chain revisits {next:#x}"));
                break;
            }
            let frag = match Fragment::read_at(&self.bytes, next) {
                Ok(f) => f,
                Err(e) => {
                    diags.structural(format!("{name}: {e}"));
                    break;
                }
            };
            if !frag.is_consistent() {
                diags.structural(format!(
                    "{name}: fragment at {next:#x} total {} < header + {} data bytes",
                    frag.total_len, frag.data_len
                ));
            }
            if frag.duplicates >= sharers {
                diags.structural(format!(
                    "{name}: fragment at {next:#x} claims {} sharers of {sharers} entries",
                    frag.duplicates
                ));
            }
            let earlier_owner = matches!(self.ledger.owner(next), Some(o) if o < i);
            if is_duplicate && !first && !earlier_owner && frag.duplicates != 0 {
                diags.structural(format!(
                    "{name}: shared fragment at {next:#x} was never attributed to an earlier entry"
                ));
            }
            let Some(payload) = frag.payload(&self.bytes) else {
                diags.structural(format!(
                    "{name}: fragment at {next:#x} payload of {} bytes runs past end of archive",
                    frag.data_len
                ));
                break;
            };
            let take = payload.len().min(want - out.len());
            out.extend_from_slice(&payload[..take]);
            tracing::trace!(
                fragment = format_args!("{next:#x}"),
                take,
                collected = out.len(),
                "fragment"
            );
            first = false;
            next = frag.next;
        }

        if out.len() < want {
            diags.structural(format!(
                "{name}: fragment chain ended after {} of {want} bytes",
                out.len()
            ));
        } else if trailing != 0 && want > 0 {
            diags.push(
                DiagnosticKind::Warning,
                format!("{name}: chain continues at {trailing:#x} after {want} bytes"),
            );
        }
        Ok(out)
    }

    /// Read entry `i` and inflate it when it is compressed.
    pub fn member(&self, i: usize) -> Result<Member> {
        self.member_with(i, true)
    }

    pub fn member_with(&self, i: usize, decompress: bool) -> Result<Member> {
        let mut diagnostics = Diagnostics::new();
        let raw = self.read_payload(i, &mut diagnostics)?;
        let stored_len = raw.len();
        let out = inflate_member(raw, decompress, &mut diagnostics);
        Ok(Member {
            index: i,
            name: self.entries[i].name.clone(),
            stored_len,
            codec: out.codec,
            inflated: out.inflated,
            bytes: out.bytes,
            diagnostics,
        })
    }
}

/// Walk every entry's chain in table order and record which entry first
/// consumes each fragment. Faults are left for `read_payload` to report.
fn claim_chains(bytes: &[u8], entries: &[FileEntry]) -> FragmentLedger {
    let mut ledger = FragmentLedger::new();
    for (i, entry) in entries.iter().enumerate() {
        let want = entry.data_size as usize;
        let mut collected = 0usize;
        let mut visited = HashSet::new();
        let mut next = entry.data_address;
        while next != 0 && collected < want && visited.insert(next) {
            let Ok(frag) = Fragment::read_at(bytes, next) else {
                break;
            };
            let Some(payload) = frag.payload(bytes) else {
                break;
            };
            ledger.claim(next, i);
            collected += payload.len().min(want - collected);
            next = frag.next;
        }
    }
    ledger
}
