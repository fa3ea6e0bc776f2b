//! Image relocation
//!
//! Copies image files into per-partition directories. A failing file never
//! aborts the batch: every file gets a [`RelocationOutcome`] and the caller
//! decides what to do with the failures.

use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CocoError, CocoResult};
use crate::utils::create_progress_bar;

/// Why a single file could not be relocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationFailure {
    MissingSource,
    SameFile,
    PermissionDenied,
    Other(String),
}

impl fmt::Display for RelocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelocationFailure::MissingSource => write!(f, "source file not found"),
            RelocationFailure::SameFile => write!(f, "source and destination are the same file"),
            RelocationFailure::PermissionDenied => write!(f, "permission denied"),
            RelocationFailure::Other(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationOutcome {
    Copied,
    /// The destination already exists; it is left untouched.
    AlreadyPresent,
    /// The name appeared earlier in the same batch.
    Duplicate,
    Failed(RelocationFailure),
}

/// Per-file result of one relocation batch, in input order.
#[derive(Debug, Default, Clone)]
pub struct RelocationReport {
    pub entries: Vec<(String, RelocationOutcome)>,
}

impl RelocationReport {
    pub fn copied(&self) -> usize {
        self.count(|outcome| matches!(outcome, RelocationOutcome::Copied))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| {
            matches!(
                outcome,
                RelocationOutcome::AlreadyPresent | RelocationOutcome::Duplicate
            )
        })
    }

    pub fn failures(&self) -> Vec<(&str, &RelocationFailure)> {
        self.entries
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                RelocationOutcome::Failed(failure) => Some((name.as_str(), failure)),
                _ => None,
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn merge(&mut self, other: RelocationReport) {
        self.entries.extend(other.entries);
    }

    pub fn print_summary(&self, label: &str) {
        info!(
            "[{}] relocated {} file(s), skipped {} already present",
            label,
            self.copied(),
            self.skipped()
        );
        let failures = self.failures();
        if !failures.is_empty() {
            warn!("[{}] {} file(s) could not be relocated:", label, failures.len());
            for (name, failure) in failures {
                warn!("  {}: {}", name, failure);
            }
        }
    }

    fn count(&self, predicate: impl Fn(&RelocationOutcome) -> bool) -> usize {
        self.entries.iter().filter(|(_, outcome)| predicate(outcome)).count()
    }
}

/// Copy `source_dir/<name>` to `dest_dir/<name>` for every name in `file_names`.
///
/// Only failing to create `dest_dir` is fatal.
pub fn relocate<S: AsRef<str>>(
    file_names: &[S],
    source_dir: &Path,
    dest_dir: &Path,
) -> CocoResult<RelocationReport> {
    fs::create_dir_all(dest_dir).map_err(|e| CocoError::io(dest_dir, e))?;

    let mut seen = HashSet::new();
    let batch: Vec<(&str, bool)> = file_names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            (name, seen.insert(name))
        })
        .collect();

    let pb = create_progress_bar(batch.len() as u64, "Copy");
    let entries = batch
        .par_iter()
        .map(|&(name, first)| {
            let outcome = if first {
                copy_one(name, source_dir, dest_dir)
            } else {
                RelocationOutcome::Duplicate
            };
            match &outcome {
                RelocationOutcome::Failed(failure) => {
                    warn!("Failed to relocate {}: {}", name, failure)
                }
                RelocationOutcome::Duplicate => debug!("Skipping duplicate name {}", name),
                _ => {}
            }
            pb.inc(1);
            (name.to_string(), outcome)
        })
        .collect();
    pb.finish_and_clear();

    Ok(RelocationReport { entries })
}

/// Copy every regular file directly inside `source_dir` into `dest_dir`.
pub fn relocate_directory(source_dir: &Path, dest_dir: &Path) -> CocoResult<RelocationReport> {
    let mut names = Vec::new();
    for entry in fs::read_dir(source_dir).map_err(|e| CocoError::io(source_dir, e))? {
        let entry = entry.map_err(|e| CocoError::io(source_dir, e))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    relocate(&names, source_dir, dest_dir)
}

fn copy_one(name: &str, source_dir: &Path, dest_dir: &Path) -> RelocationOutcome {
    let source = source_dir.join(name);
    let dest = dest_dir.join(name);

    if !source.is_file() {
        return RelocationOutcome::Failed(RelocationFailure::MissingSource);
    }
    if same_file(&source, &dest) {
        return RelocationOutcome::Failed(RelocationFailure::SameFile);
    }
    if dest.exists() {
        return RelocationOutcome::AlreadyPresent;
    }
    if let Some(parent) = dest.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return RelocationOutcome::Failed(classify(e));
        }
    }
    match fs::copy(&source, &dest) {
        Ok(_) => RelocationOutcome::Copied,
        Err(e) => RelocationOutcome::Failed(classify(e)),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (canonical(a), canonical(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn canonical(path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).ok()
}

fn classify(e: io::Error) -> RelocationFailure {
    match e.kind() {
        io::ErrorKind::NotFound => RelocationFailure::MissingSource,
        io::ErrorKind::PermissionDenied => RelocationFailure::PermissionDenied,
        _ => RelocationFailure::Other(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.jpg"), b"a").unwrap();
        fs::write(src.join("c.jpg"), b"c").unwrap();

        let report = relocate(&["a.jpg", "b.jpg", "c.jpg"], &src, &dst).unwrap();

        assert_eq!(report.copied(), 2);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0], ("b.jpg", &RelocationFailure::MissingSource));
        assert_eq!(fs::read(dst.join("c.jpg")).unwrap(), b"c");
        assert_eq!(report.entries[1].0, "b.jpg");
    }

    #[test]
    fn test_existing_destination_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("a.jpg"), b"new").unwrap();
        fs::write(dst.join("a.jpg"), b"old").unwrap();

        let report = relocate(&["a.jpg", "a.jpg"], &src, &dst).unwrap();

        assert_eq!(report.skipped(), 2);
        assert!(report.is_complete());
        assert_eq!(fs::read(dst.join("a.jpg")).unwrap(), b"old");
    }

    #[test]
    fn test_same_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();

        let report = relocate(&["a.jpg"], dir.path(), dir.path()).unwrap();
        assert_eq!(report.failures(), vec![("a.jpg", &RelocationFailure::SameFile)]);
    }

    #[test]
    fn test_nested_names_create_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("row1")).unwrap();
        fs::write(src.join("row1/a.jpg"), b"a").unwrap();

        let dst = dir.path().join("dst");
        let report = relocate(&["row1/a.jpg"], &src, &dst).unwrap();
        assert_eq!(report.copied(), 1);
        assert!(dst.join("row1/a.jpg").is_file());
    }

    #[test]
    fn test_relocate_directory_copies_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.jpg"), b"a").unwrap();
        fs::write(src.join("b.png"), b"b").unwrap();

        let dst = dir.path().join("dst");
        let report = relocate_directory(&src, &dst).unwrap();
        assert_eq!(report.copied(), 2);
        assert!(!dst.join("nested").exists());
    }
}
