use jwalk::WalkDir;
use std::collections::HashSet;
use std::path::Path;

use crate::coco::AnnotationStore;
use crate::utils::is_image_file;

/// Difference between the images a store references and the files on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImageValidation {
    /// `file_name`s with no file under the image directory.
    pub missing: Vec<String>,
    /// Image files under the directory that no image record references.
    pub unreferenced: Vec<String>,
}

impl ImageValidation {
    pub fn is_exact_match(&self) -> bool {
        self.missing.is_empty() && self.unreferenced.is_empty()
    }
}

/// Compare `store.images` against the image files below `image_dir`.
pub fn validate_images(store: &AnnotationStore, image_dir: &Path) -> ImageValidation {
    let mut missing: Vec<String> = store
        .images
        .iter()
        .filter(|image| !image_dir.join(&image.file_name).is_file())
        .map(|image| image.file_name.clone())
        .collect();
    missing.sort();
    missing.dedup();

    let referenced: HashSet<&str> = store.images.iter().map(|i| i.file_name.as_str()).collect();
    let mut unreferenced: Vec<String> = WalkDir::new(image_dir)
        .skip_hidden(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image_file(&e.path()))
        .filter_map(|e| {
            e.path()
                .strip_prefix(image_dir)
                .ok()
                .map(|relative| relative.to_string_lossy().replace('\\', "/"))
        })
        .filter(|relative| !referenced.contains(relative.as_str()))
        .collect();
    unreferenced.sort();

    ImageValidation {
        missing,
        unreferenced,
    }
}
