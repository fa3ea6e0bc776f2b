use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type CocoResult<T> = Result<T, CocoError>;

/// Fatal failures of the dataset pipeline.
///
/// Per-file copy problems are not represented here; they are collected in a
/// [`crate::relocate::RelocationReport`] and never abort a batch.
#[derive(Debug, Error)]
pub enum CocoError {
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("json error at {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("yaml error at {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("malformed annotation store {}: {reason}", .path.display())]
    MalformedStore { path: PathBuf, reason: String },
    #[error("split ratio must lie in the open interval (0, 1), got {0}")]
    InvalidRatio(f64),
    #[error("nothing to split: {0}")]
    EmptyDataset(String),
    #[error(
        "{} image file(s) referenced by {} are missing from {}: {}",
        .missing.len(),
        .ann_path.display(),
        .image_dir.display(),
        .missing.join(", ")
    )]
    Validation {
        ann_path: PathBuf,
        image_dir: PathBuf,
        missing: Vec<String>,
    },
    #[error("category id {id} is named {existing:?} in one store and {incoming:?} in another")]
    CategoryConflict {
        id: u64,
        existing: String,
        incoming: String,
    },
    #[error("required directory or file not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("{} image(s) match none of the name keys: {}", .0.len(), .0.join(", "))]
    UncoveredImages(Vec<String>),
    #[error("{kind} count changed from {expected} to {found} after separation")]
    CountMismatch {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
}

impl CocoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CocoError::Io {
            path: path.into(),
            source,
        }
    }
}
