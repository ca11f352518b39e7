use crate::container::entry::Entry;
use crate::error::{GarcError, Result};
use crate::read::opened::ArcFile;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Reply of the progress callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArchiveOperation {
    Continue,
    /// Leave the upcoming entry out.
    Skip,
    Stop,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stopped: bool,
}

/// Write entry `index` under `dest`, returning the created path.
pub fn extract_entry(arc: &ArcFile, index: usize, dest: &Path) -> Result<PathBuf> {
    let entry = arc.entry(index)?;
    let outp = safe_join(dest, &entry.name)?;
    if let Some(parent) = outp.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut input = arc.open_entry(index)?;
    let mut out = File::create(&outp)?;
    io::copy(&mut input, &mut out)?;
    out.flush()?;
    Ok(outp)
}

/// Extract every entry, asking `progress` before each one.
///
/// `progress(index, entry, message)` also receives failures as messages;
/// a failed entry never aborts the rest.
pub fn extract_all<F>(arc: &ArcFile, dest: &Path, mut progress: F) -> Result<ExtractSummary>
where
    F: FnMut(usize, Option<&Entry>, Option<&str>) -> ArchiveOperation,
{
    let mut summary = ExtractSummary::default();
    fs::create_dir_all(dest)?;
    for (i, entry) in arc.entries().iter().enumerate() {
        match progress(i, Some(entry), None) {
            ArchiveOperation::Stop => {
                summary.stopped = true;
                break;
            }
            ArchiveOperation::Skip => {
                summary.skipped += 1;
                continue;
            }
            ArchiveOperation::Continue => {}
        }
        match extract_entry(arc, i, dest) {
            Ok(path) => {
                tracing::trace!(entry = %entry.name, path = %path.display(), "extracted");
                summary.extracted += 1;
            }
            Err(e) => {
                if matches!(e, GarcError::EmptyEntry(_)) {
                    tracing::info!(entry = %entry.name, "skipping empty entry");
                } else {
                    tracing::warn!(entry = %entry.name, error = %e, "extraction failed");
                }
                summary.failed += 1;
                let msg = e.to_string();
                if progress(i, Some(entry), Some(&msg)) == ArchiveOperation::Stop {
                    summary.stopped = true;
                    break;
                }
            }
        }
    }
    Ok(summary)
}

/// Join an archive entry name under `root`, refusing to escape it.
pub(crate) fn safe_join(root: &Path, rel: &str) -> Result<PathBuf> {
    let rel = rel.replace('\\', "/");
    let p = Path::new(&rel);
    if p.is_absolute() || p.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(GarcError::malformed_index(format!("unsafe entry path: {rel}")));
    }
    Ok(root.join(p))
}
