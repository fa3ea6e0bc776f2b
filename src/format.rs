//! Rewriting image file extensions inside a store

use log::info;
use std::path::{Path, PathBuf};

use crate::coco::{self, AnnotationStore};
use crate::error::CocoResult;

/// Replace the extension of every image `file_name` with `format`.
///
/// Only the last extension is replaced and directories in `file_name` are
/// kept. A leading dot in `format` is ignored. Returns the number of changed
/// records.
pub fn replace_image_format(store: &mut AnnotationStore, format: &str) -> usize {
    let format = format.trim_start_matches('.');
    let mut changed = 0;
    for image in &mut store.images {
        let renamed = PathBuf::from(&image.file_name)
            .with_extension(format)
            .to_string_lossy()
            .replace('\\', "/");
        if renamed != image.file_name {
            image.file_name = renamed;
            changed += 1;
        }
    }
    changed
}

/// Rewrite the image extensions of `ann_path` in place.
pub fn replace_format_file(ann_path: &Path, format: &str) -> CocoResult<usize> {
    let mut store = coco::load(ann_path)?;
    let changed = replace_image_format(&mut store, format);
    coco::write(ann_path, &store)?;
    info!(
        "Replaced the extension of {} image(s) in {} with {}",
        changed,
        ann_path.display(),
        format
    );
    Ok(changed)
}
