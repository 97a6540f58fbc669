//! Joins over parallel arrays.
//!
//! Entities in a member file are spread over several blocks that share an
//! element index. Cross-references between entity kinds are stored as 1-based
//! indices with 0 meaning "none". Every join site goes through the helpers
//! here so the length rules and the index translation live in one place.

use std::sync::OnceLock;
use thiserror::Error;

use crate::block::typed::{BlockType, RecordArray, TypedArray};
use crate::decode::BlockMap;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("array {key:?} not present")]
    MissingArray { key: String },

    #[error("array {key:?} is {actual}, expected {expected}")]
    WrongShape {
        key: String,
        expected: BlockType,
        actual: BlockType,
    },

    #[error("{name}: {actual} elements where {primary} are required")]
    LengthMismatch {
        name: String,
        primary: usize,
        actual: usize,
    },

    #[error("{field}: index {raw} is past the end of {len} elements")]
    IndexOutOfRange { field: String, raw: u32, len: usize },

    #[error("{field}: required reference is 0")]
    Absent { field: String },

    #[error("{field}: pair list of odd length {len}")]
    Unpaired { field: String, len: usize },

    #[error("{name} depends on {needs}, which could not be built")]
    Dependency {
        name: &'static str,
        needs: &'static str,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthPolicy {
    Exact,
    /// Trailing extra elements are tolerated and ignored.
    AllowLonger,
}

/// Check a secondary array's length against the primary array's.
pub fn check_len(
    name: &str,
    primary: usize,
    actual: usize,
    policy: LengthPolicy,
) -> Result<(), JoinError> {
    let ok = match policy {
        LengthPolicy::Exact => actual == primary,
        LengthPolicy::AllowLonger => actual >= primary,
    };
    if ok {
        Ok(())
    } else {
        Err(JoinError::LengthMismatch {
            name: name.to_string(),
            primary,
            actual,
        })
    }
}

/// 1-based stored index to 0-based position. 0 means absent.
pub fn resolve_one_based(raw: u32) -> Option<usize> {
    (raw as usize).checked_sub(1)
}

/// Resolve a stored 1-based reference into `items`.
pub fn lookup<'a, T>(field: &str, raw: u32, items: &'a [T]) -> Result<Option<&'a T>, JoinError> {
    match resolve_one_based(raw) {
        None => Ok(None),
        Some(i) => items.get(i).map(Some).ok_or_else(|| JoinError::IndexOutOfRange {
            field: field.to_string(),
            raw,
            len: items.len(),
        }),
    }
}

/// Like [`lookup`], for references that may not be 0.
pub fn lookup_required<'a, T>(field: &str, raw: u32, items: &'a [T]) -> Result<&'a T, JoinError> {
    lookup(field, raw, items)?.ok_or_else(|| JoinError::Absent {
        field: field.to_string(),
    })
}

/// Like [`lookup_required`] but yields the 0-based position.
pub fn position_required(field: &str, raw: u32, len: usize) -> Result<usize, JoinError> {
    match resolve_one_based(raw) {
        None => Err(JoinError::Absent {
            field: field.to_string(),
        }),
        Some(i) if i < len => Ok(i),
        Some(_) => Err(JoinError::IndexOutOfRange {
            field: field.to_string(),
            raw,
            len,
        }),
    }
}

/// Typed access to the arrays of one decoded member file.
#[derive(Clone, Copy)]
pub struct Columns<'a> {
    map: &'a BlockMap,
}

impl<'a> Columns<'a> {
    pub fn new(map: &'a BlockMap) -> Self {
        Self { map }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn records(&self, key: &str, size: u32) -> Result<&'a RecordArray, JoinError> {
        let arr = self.get(key)?;
        match arr.as_records() {
            Some(r) if r.record_size() == size as usize => Ok(r),
            _ => Err(self.wrong_shape(key, BlockType::records(size), arr.block_type())),
        }
    }

    pub fn strings(&self, key: &str) -> Result<&'a [Vec<u8>], JoinError> {
        let arr = self.get(key)?;
        arr.as_strings()
            .ok_or_else(|| self.wrong_shape(key, BlockType::Strings, arr.block_type()))
    }

    pub fn segments(&self, key: &str) -> Result<&'a [Vec<u32>], JoinError> {
        let arr = self.get(key)?;
        arr.as_segments()
            .ok_or_else(|| self.wrong_shape(key, BlockType::Segments, arr.block_type()))
    }

    /// A strings array that may be missing entirely; missing reads as empty.
    pub fn strings_or_empty(&self, key: &str) -> Result<&'a [Vec<u8>], JoinError> {
        match self.strings(key) {
            Err(JoinError::MissingArray { .. }) => Ok(&[][..]),
            other => other,
        }
    }

    fn get(&self, key: &str) -> Result<&'a TypedArray, JoinError> {
        self.map.get(key).ok_or_else(|| JoinError::MissingArray {
            key: key.to_string(),
        })
    }

    fn wrong_shape(&self, key: &str, expected: BlockType, actual: BlockType) -> JoinError {
        JoinError::WrongShape {
            key: key.to_string(),
            expected,
            actual,
        }
    }
}

/// A composite collection built at most once.
///
/// The first `get_or_build` runs the builder. A failed build is logged and
/// remembered, so consumers see `None` rather than an empty collection.
pub struct Built<T> {
    name: &'static str,
    cell: OnceLock<Option<Vec<T>>>,
}

#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuildState {
    Unbuilt,
    Ready(usize),
    Unavailable,
}

impl<T> Built<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceLock::new(),
        }
    }

    pub fn get_or_build<F>(&self, build: F) -> Option<&[T]>
    where
        F: FnOnce() -> Result<Vec<T>, JoinError>,
    {
        self.cell
            .get_or_init(|| match build() {
                Ok(v) => {
                    tracing::debug!(name = self.name, len = v.len(), "composite built");
                    Some(v)
                }
                Err(e) => {
                    tracing::warn!(name = self.name, error = %e, "composite unavailable");
                    None
                }
            })
            .as_deref()
    }

    #[cfg(test)]
    fn state(&self) -> BuildState {
        match self.cell.get() {
            None => BuildState::Unbuilt,
            Some(Some(v)) => BuildState::Ready(v.len()),
            Some(None) => BuildState::Unavailable,
        }
    }
}
