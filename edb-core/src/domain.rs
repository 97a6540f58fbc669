use serde::Serialize;
use std::path::PathBuf;

use crate::codec::CodecId;

/// One file-table row as shown by `list`.
#[derive(Clone, Debug, Serialize)]
pub struct FileRow {
    pub index: usize,
    pub name: String,
    pub size: u32,
    pub data_address: u32,
    pub duplicate_of: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractOutcome {
    Written { path: PathBuf },
    Linked { path: PathBuf, to: PathBuf },
    Skipped,
    Failed,
}

/// One file-table row after extraction.
#[derive(Clone, Debug, Serialize)]
pub struct ExtractRow {
    pub index: usize,
    pub name: String,
    pub size: u32,
    pub codec: Option<CodecId>,
    pub inflated: bool,
    pub duplicate_of: Option<usize>,
    #[serde(flatten)]
    pub outcome: ExtractOutcome,
}
