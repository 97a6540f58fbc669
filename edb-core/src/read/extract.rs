use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use super::archive::Archive;
use crate::container::header::DatabaseHeader;
use crate::diag::{DiagnosticKind, Diagnostics};
use crate::domain::{ExtractOutcome, ExtractRow};
use crate::error::{EdbError, Result};
use crate::policy::{DuplicatePolicy, ExtractOptions};
use crate::stats::ExtractStats;

#[derive(Debug, Serialize)]
pub struct ExtractReport {
    pub archive: PathBuf,
    pub dest: PathBuf,
    pub header: DatabaseHeader,
    pub entries: Vec<ExtractRow>,
    pub stats: ExtractStats,
    pub diagnostics: Diagnostics,
    /// False when any structural, payload or write problem was recorded.
    pub ok: bool,
}

/// Materialize every member file of `archive` under `dest`.
///
/// Only an unreadable archive, a truncated header, or an uncreatable
/// destination stop the run. Everything else is recorded in the report.
pub fn extract(archive: &Path, dest: &Path, opts: &ExtractOptions) -> Result<ExtractReport> {
    let mut db = Archive::open(archive)?;
    fs::create_dir_all(dest)?;

    let mut diags = std::mem::take(&mut db.diagnostics);
    let mut stats = ExtractStats::default();
    let mut rows = Vec::with_capacity(db.len());
    let mut outputs: Vec<Option<PathBuf>> = Vec::with_capacity(db.len());

    for i in 0..db.len() {
        let entry = &db.entries[i];
        let name = entry.name.clone();
        let size = entry.data_size;
        let duplicate_of = db.duplicate_of(i);
        let mut row = ExtractRow {
            index: i,
            name: name.clone(),
            size,
            codec: None,
            inflated: false,
            duplicate_of,
            outcome: ExtractOutcome::Failed,
        };

        let earlier = duplicate_of.and_then(|j| outputs[j].clone());
        row.outcome = match (duplicate_of, opts.duplicates) {
            (Some(j), DuplicatePolicy::SkipDuplicates) => {
                tracing::debug!(%name, of = j, "duplicate skipped");
                ExtractOutcome::Skipped
            }
            (Some(_), DuplicatePolicy::LinkDuplicates) if earlier.is_some() => {
                link_entry(dest, &name, earlier.as_deref(), &mut diags)
            }
            _ => materialize(&db, i, dest, opts, &mut row, &mut stats, &mut diags),
        };

        match &row.outcome {
            ExtractOutcome::Written { path } => {
                stats.written += 1;
                outputs.push(Some(path.clone()));
            }
            ExtractOutcome::Linked { path, .. } => {
                stats.linked += 1;
                outputs.push(Some(path.clone()));
            }
            ExtractOutcome::Skipped => {
                stats.skipped += 1;
                outputs.push(None);
            }
            ExtractOutcome::Failed => {
                stats.failed += 1;
                outputs.push(None);
            }
        }
        rows.push(row);
    }

    let ok = !diags.has_failures();
    tracing::info!(
        written = stats.written,
        linked = stats.linked,
        skipped = stats.skipped,
        failed = stats.failed,
        diagnostics = diags.len(),
        ok,
        "extraction finished"
    );
    Ok(ExtractReport {
        archive: archive.to_path_buf(),
        dest: dest.to_path_buf(),
        header: db.header.clone(),
        entries: rows,
        stats,
        diagnostics: diags,
        ok,
    })
}

fn materialize(
    db: &Archive,
    i: usize,
    dest: &Path,
    opts: &ExtractOptions,
    row: &mut ExtractRow,
    stats: &mut ExtractStats,
    diags: &mut Diagnostics,
) -> ExtractOutcome {
    let name = row.name.clone();
    let path = match safe_join(dest, &name) {
        Ok(p) => p,
        Err(e) => {
            diags.structural(e.to_string());
            return ExtractOutcome::Failed;
        }
    };
    let member = match db.member_with(i, opts.decompress) {
        Ok(m) => m,
        Err(e) => {
            diags.push(e.diagnostic_kind(), format!("{name}: {e}"));
            return ExtractOutcome::Failed;
        }
    };
    diags.extend(member.diagnostics);
    row.codec = Some(member.codec);
    row.inflated = member.inflated;
    stats.stored_bytes += member.stored_len as u64;
    if member.inflated {
        stats.compressed_members += 1;
    }

    match write_atomic(&path, &member.bytes) {
        Ok(()) => {
            stats.output_bytes += member.bytes.len() as u64;
            tracing::debug!(%name, bytes = member.bytes.len(), "member written");
            ExtractOutcome::Written { path }
        }
        Err(e) => {
            diags.push(
                DiagnosticKind::Resource,
                format!("{name}: write {}: {e}", path.display()),
            );
            ExtractOutcome::Failed
        }
    }
}

fn link_entry(
    dest: &Path,
    name: &str,
    earlier: Option<&Path>,
    diags: &mut Diagnostics,
) -> ExtractOutcome {
    let Some(to) = earlier else {
        return ExtractOutcome::Failed;
    };
    let path = match safe_join(dest, name) {
        Ok(p) => p,
        Err(e) => {
            diags.structural(e.to_string());
            return ExtractOutcome::Failed;
        }
    };
    match hard_link(to, &path) {
        Ok(()) => {
            tracing::debug!(%name, to = %to.display(), "duplicate linked");
            ExtractOutcome::Linked {
                path,
                to: to.to_path_buf(),
            }
        }
        Err(e) => {
            diags.push(
                DiagnosticKind::Resource,
                format!("{name}: link to {}: {e}", to.display()),
            );
            ExtractOutcome::Failed
        }
    }
}

fn hard_link(to: &Path, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::hard_link(to, path)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new().prefix(".edb_").tempfile_in(dir)?;
    tmp.as_file_mut().write_all(bytes)?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Join a stored member name onto `root`, refusing names that would escape
/// it.
pub fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
    let unsafe_path = || EdbError::Format(format!("unsafe member name: {rel:?}"));
    if rel.is_empty() || rel.contains("..\\") || rel.starts_with('\\') {
        return Err(unsafe_path());
    }
    let p = Path::new(rel);
    if p.is_absolute() || !p.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(unsafe_path());
    }
    Ok(root.join(p))
}
