use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use edb_core::block::decode_by_tag;
use edb_core::block::stream::walk_blocks;
use edb_core::block::typed::{BlockType, CountCell};
use edb_core::codec::inflate_member;
use edb_core::domain::ExtractOutcome;
use edb_core::error::{EdbError, Result};
use edb_core::{Diagnostics, DuplicatePolicy, EntityKind, ExtractOptions, Sheet, extract, list};
use serde::Serialize;
use walkdir::WalkDir;

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| EdbError::Format(format!("json: {e}")))
}

fn default_dest(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    archive.with_file_name(format!("{stem}.extracted"))
}

pub fn handle_extract(
    archive: PathBuf,
    dest: Option<PathBuf>,
    no_decompress: bool,
    link_duplicates: bool,
    skip_duplicates: bool,
    report_path: Option<PathBuf>,
) -> Result<ExitCode> {
    let duplicates = if link_duplicates {
        DuplicatePolicy::LinkDuplicates
    } else if skip_duplicates {
        DuplicatePolicy::SkipDuplicates
    } else {
        DuplicatePolicy::MaterializeAll
    };
    let opts = ExtractOptions {
        decompress: !no_decompress,
        duplicates,
    };
    let dest = dest.unwrap_or_else(|| default_dest(&archive));

    let report = extract(&archive, &dest, &opts)?;
    for row in &report.entries {
        let outcome = match &row.outcome {
            ExtractOutcome::Written { .. } if row.inflated => "written (inflated)".to_string(),
            ExtractOutcome::Written { .. } => "written".to_string(),
            ExtractOutcome::Linked { to, .. } => format!("linked -> {}", to.display()),
            ExtractOutcome::Skipped => "skipped".to_string(),
            ExtractOutcome::Failed => "FAILED".to_string(),
        };
        println!("{:<40} {:>10} bytes  {}", row.name, row.size, outcome);
    }

    if let Some(p) = report_path {
        fs::write(&p, to_json(&report)?)?;
    }

    if report.ok {
        eprintln!("extract: OK ({} entries)", report.entries.len());
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("extract: {} problem(s) recorded", report.diagnostics.len());
        Ok(ExitCode::from(1))
    }
}

pub fn handle_list(archive: PathBuf, json: bool) -> Result<ExitCode> {
    let listing = list(&archive)?;
    if json {
        println!("{}", to_json(&listing)?);
        return Ok(ExitCode::SUCCESS);
    }
    if !listing.supported {
        eprintln!(
            "list: file version {} has no known layout; entries may be wrong",
            listing.header.file_version
        );
    }
    for row in &listing.entries {
        let dup = row
            .duplicate_of
            .map(|j| format!("  same as #{j}"))
            .unwrap_or_default();
        println!(
            "#{:<4} {:<40} {:>10} bytes  off={:#x}{dup}",
            row.index, row.name, row.size, row.data_address
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub fn handle_blocks(path: PathBuf) -> Result<ExitCode> {
    let mut failed = false;
    for entry in WalkDir::new(&path).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let mut diags = Diagnostics::new();
        let bytes = inflate_member(fs::read(entry.path())?, true, &mut diags).bytes;

        println!("{}", entry.path().display());
        let summary = walk_blocks(&bytes, |h, cur| {
            let shape = BlockType::from_tag(h.tag)
                .map_or_else(|| format!("unknown({:#010x})", h.tag), |t| t.to_string());
            let len = decode_by_tag(cur, h.tag, &mut CountCell::Unconstrained)?
                .map_or_else(|| "-".to_string(), |a| a.len().to_string());
            println!("  {:>8x}  {:<32} {:<14} {:>8}", h.offset, h.key, shape, len);
            Ok(())
        });
        diags.extend(summary.diagnostics);
        for d in diags.iter() {
            println!("  ! {d}");
        }
        failed |= diags.has_failures();
    }
    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

#[derive(Serialize)]
struct SheetOutput<'a, T: Serialize> {
    #[serde(flatten)]
    body: T,
    diagnostics: &'a Diagnostics,
}

pub fn handle_sheet(file: PathBuf, entity: Option<EntityKind>, index: usize) -> Result<ExitCode> {
    let mut diags = Diagnostics::new();
    let bytes = inflate_member(fs::read(&file)?, true, &mut diags).bytes;
    let (sheet, decode_diags) = Sheet::decode(&bytes);
    diags.extend(decode_diags);

    let json = match entity {
        Some(kind) => {
            let found = sheet.entity(kind, index).ok_or_else(|| {
                EdbError::Format(format!("no {kind} at index {index} in {}", file.display()))
            })?;
            to_json(&found)?
        }
        None => to_json(&SheetOutput {
            body: sheet.dump(),
            diagnostics: &diags,
        })?,
    };
    println!("{json}");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dest_sits_beside_archive() {
        let p = default_dest(Path::new("/work/board.db"));
        assert_eq!(p, Path::new("/work/board.extracted"));
    }

    #[test]
    fn blocks_over_a_directory_of_member_files() {
        let tmp = tempfile::tempdir().unwrap();
        // One 4-byte record block holding [7], then the stream end.
        let mut file = Vec::new();
        file.extend_from_slice(&3u32.to_le_bytes());
        file.extend_from_slice(b"Key");
        for v in [0x0100_0004u32, 8] {
            file.extend_from_slice(&v.to_le_bytes());
        }
        file.extend_from_slice(&[0; 20]);
        for v in [7u32, 0x4FFF_FFFF, 0] {
            file.extend_from_slice(&v.to_le_bytes());
        }
        fs::write(tmp.path().join("Sheet1"), &file).unwrap();

        let code = handle_blocks(tmp.path().to_path_buf()).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn sheet_entity_out_of_range_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("empty");
        fs::write(&p, 0u32.to_le_bytes()).unwrap();
        assert!(handle_sheet(p, Some(EntityKind::Net), 0).is_err());
    }
}
