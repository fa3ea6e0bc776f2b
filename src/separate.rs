//! Separating a store into one store per file-name key
//!
//! Every image must land in exactly one group: an image matching no key is an
//! error, and an image matching several keys shows up as a count mismatch.
//! Nothing is written until both checks pass.

use log::info;
use std::path::{Path, PathBuf};

use crate::coco::{self, AnnotationStore};
use crate::error::{CocoError, CocoResult};
use crate::filter::annotations_for_images;
use crate::relocate::relocate;

/// One store per key, holding the images whose `file_name` contains the key.
///
/// Every group keeps all categories and the source metadata.
pub fn separate_by_name(
    store: &AnnotationStore,
    name_keys: &[String],
) -> CocoResult<Vec<(String, AnnotationStore)>> {
    let groups: Vec<(String, AnnotationStore)> = name_keys
        .iter()
        .map(|key| {
            let images: Vec<_> = store
                .images
                .iter()
                .filter(|image| image.file_name.contains(key.as_str()))
                .collect();
            let annotations = annotations_for_images(&store.annotations, images.iter().copied());
            let group = AnnotationStore {
                info: store.info.clone(),
                licenses: store.licenses.clone(),
                images: images.into_iter().cloned().collect(),
                annotations: annotations.into_iter().cloned().collect(),
                categories: store.categories.clone(),
            };
            (key.clone(), group)
        })
        .collect();

    let mut uncovered: Vec<String> = store
        .images
        .iter()
        .filter(|image| !name_keys.iter().any(|key| image.file_name.contains(key.as_str())))
        .map(|image| image.file_name.clone())
        .collect();
    if !uncovered.is_empty() {
        uncovered.sort();
        return Err(CocoError::UncoveredImages(uncovered));
    }

    let image_count: usize = groups.iter().map(|(_, g)| g.images.len()).sum();
    if image_count != store.images.len() {
        return Err(CocoError::CountMismatch {
            kind: "image",
            expected: store.images.len(),
            found: image_count,
        });
    }
    let annotation_count: usize = groups.iter().map(|(_, g)| g.annotations.len()).sum();
    if annotation_count != store.annotations.len() {
        return Err(CocoError::CountMismatch {
            kind: "annotation",
            expected: store.annotations.len(),
            found: annotation_count,
        });
    }

    Ok(groups)
}

/// Separate `ann_path` by `name_keys`, next to the image directory.
///
/// For every key, images are copied to `<parent>/<key>/` and the store is
/// written to `<parent>/<key>.json`, where `<parent>` is the parent of
/// `image_dir`. Returns the written annotation files.
pub fn separate_file(
    image_dir: &Path,
    ann_path: &Path,
    name_keys: &[String],
) -> CocoResult<Vec<PathBuf>> {
    let store = coco::load(ann_path)?;
    let groups = separate_by_name(&store, name_keys)?;
    let parent = image_dir.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut written = Vec::with_capacity(groups.len());
    for (key, group) in groups {
        let names: Vec<String> = group.images.iter().map(|i| i.file_name.clone()).collect();
        let report = relocate(&names, image_dir, &parent.join(&key))?;
        report.print_summary(&key);

        let output = parent.join(format!("{}.json", key));
        coco::write(&output, &group)?;
        info!(
            "{}: {} images, {} annotations",
            key,
            group.images.len(),
            group.annotations.len()
        );
        written.push(output);
    }
    Ok(written)
}
