use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{CocoError, CocoResult};

// Supported image formats
pub const IMG_FORMATS: &[&str] = &[
    "bmp", "dng", "jpeg", "jpg", "mpo", "png", "tif", "tiff", "webp", "pfm",
];

static IMAGE_EXTENSIONS_SET: OnceLock<HashSet<String>> = OnceLock::new();

/// Get the image extensions set
pub fn get_image_extensions_set() -> &'static HashSet<String> {
    IMAGE_EXTENSIONS_SET.get_or_init(|| IMG_FORMATS.iter().map(|ext| ext.to_lowercase()).collect())
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| get_image_extensions_set().contains(&ext.to_string_lossy().to_lowercase()))
        .unwrap_or(false)
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .progress_chars("#>-"),
    );
    pb
}

/// Create `path` and its parents, keeping anything already there.
pub fn create_output_directory(path: &Path) -> CocoResult<PathBuf> {
    fs::create_dir_all(path).map_err(|e| CocoError::io(path, e))?;
    Ok(path.to_path_buf())
}

/// Create a fresh directory `root/<unix-seconds>`, appending `-1`, `-2`, ...
/// when a run in the same second already claimed the name.
pub fn create_timestamped_directory(root: &Path) -> CocoResult<PathBuf> {
    fs::create_dir_all(root).map_err(|e| CocoError::io(root, e))?;
    let stamp = chrono::Utc::now().timestamp();
    let mut suffix = 0usize;
    loop {
        let name = if suffix == 0 {
            stamp.to_string()
        } else {
            format!("{}-{}", stamp, suffix)
        };
        let candidate = root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(CocoError::io(&candidate, e)),
        }
    }
}

/// `dir/<stem><suffix>.json` next to `path`.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}.json", stem, suffix))
}
