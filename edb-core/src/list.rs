use serde::Serialize;
use std::path::Path;

use crate::container::header::DatabaseHeader;
use crate::diag::Diagnostics;
use crate::domain::FileRow;
use crate::error::Result;
use crate::read::archive::Archive;

#[derive(Debug, Serialize)]
pub struct Listing {
    pub header: DatabaseHeader,
    /// Whether the header's file version has a known layout.
    pub supported: bool,
    pub entries: Vec<FileRow>,
    pub diagnostics: Diagnostics,
}

/// Header and file table of `archive`, without reading any member data.
pub fn list(archive: &Path) -> Result<Listing> {
    let db = Archive::open(archive)?;
    let entries = db
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| FileRow {
            index: i,
            name: e.name.clone(),
            size: e.data_size,
            data_address: e.data_address,
            duplicate_of: db.duplicate_of(i),
        })
        .collect();
    Ok(Listing {
        supported: db.header.is_supported(),
        header: db.header,
        entries,
        diagnostics: db.diagnostics,
    })
}
