//! Combining annotation stores

use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::coco::{self, AnnotationStore, Category};
use crate::error::{CocoError, CocoResult};

/// Referential union of `base` and `incoming`.
///
/// Ids are not renumbered: images and annotations of the two stores are
/// assumed to be disjoint already. Categories are unioned by id and must
/// agree on their name. `info` and `licenses` come from `base`.
pub fn combine(base: AnnotationStore, incoming: AnnotationStore) -> CocoResult<AnnotationStore> {
    let AnnotationStore {
        info,
        licenses,
        mut images,
        mut annotations,
        mut categories,
    } = base;

    let image_ids: HashSet<u64> = images.iter().map(|i| i.id).collect();
    let overlapping = incoming
        .images
        .iter()
        .filter(|i| image_ids.contains(&i.id))
        .count();
    if overlapping > 0 {
        warn!(
            "{} image id(s) appear in both stores; ids are kept as they are",
            overlapping
        );
    }

    for category in incoming.categories {
        match categories.iter().find(|c| c.id == category.id) {
            Some(existing) if existing.name != category.name => {
                return Err(CocoError::CategoryConflict {
                    id: category.id,
                    existing: existing.name.clone(),
                    incoming: category.name,
                })
            }
            Some(_) => {}
            None => categories.push(category),
        }
    }
    images.extend(incoming.images);
    annotations.extend(incoming.annotations);

    Ok(AnnotationStore {
        info,
        licenses,
        images,
        annotations,
        categories,
    })
}

/// Merge several stores into one, renumbering image and annotation ids
/// from 1 and unifying categories by name.
///
/// Category ids are taken from the first store that names the category;
/// later names that collide with a taken id get the next free id.
pub fn merge_renumbered(stores: Vec<AnnotationStore>) -> AnnotationStore {
    let mut merged = AnnotationStore::default();
    let mut by_name: HashMap<String, u64> = HashMap::new();
    let mut next_image_id = 1u64;
    let mut next_annotation_id = 1u64;

    for (index, store) in stores.into_iter().enumerate() {
        if index == 0 {
            merged.info = store.info.clone();
            merged.licenses = store.licenses.clone();
        }

        let mut category_map: HashMap<u64, u64> = HashMap::new();
        for category in store.categories {
            let new_id = match by_name.get(&category.name) {
                Some(&id) => id,
                None => {
                    let taken: HashSet<u64> = merged.categories.iter().map(|c| c.id).collect();
                    let id = if taken.contains(&category.id) {
                        taken.iter().max().copied().unwrap_or(0) + 1
                    } else {
                        category.id
                    };
                    by_name.insert(category.name.clone(), id);
                    merged.categories.push(Category { id, ..category.clone() });
                    id
                }
            };
            category_map.insert(category.id, new_id);
        }

        let mut image_map: HashMap<u64, u64> = HashMap::new();
        for mut image in store.images {
            image_map.insert(image.id, next_image_id);
            image.id = next_image_id;
            next_image_id += 1;
            merged.images.push(image);
        }

        for mut ann in store.annotations {
            let (Some(&image_id), Some(&category_id)) =
                (image_map.get(&ann.image_id), category_map.get(&ann.category_id))
            else {
                warn!(
                    "Skipping annotation {} with dangling image or category reference",
                    ann.id
                );
                continue;
            };
            ann.id = next_annotation_id;
            ann.image_id = image_id;
            ann.category_id = category_id;
            next_annotation_id += 1;
            merged.annotations.push(ann);
        }
    }

    merged.categories.sort_by_key(|c| c.id);
    merged
}

/// Every `*.json` file directly inside `dir`, sorted by name.
pub fn annotation_files(dir: &Path) -> CocoResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CocoError::MissingDirectory(dir.to_path_buf()));
    }
    let pattern = dir.join("*.json");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| CocoError::MalformedStore {
            path: dir.to_path_buf(),
            reason: format!("invalid glob pattern: {}", e),
        })?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    Ok(files)
}

/// Load and merge every store in `dir`, writing the result to `output`.
pub fn merge_directory(dir: &Path, output: &Path, renumber: bool) -> CocoResult<AnnotationStore> {
    let files = annotation_files(dir)?;
    if files.is_empty() {
        return Err(CocoError::EmptyDataset(format!(
            "no annotation files in {}",
            dir.display()
        )));
    }

    let stores = files
        .iter()
        .map(|path| coco::load(path))
        .collect::<CocoResult<Vec<_>>>()?;
    info!("Merging {} annotation files from {}", stores.len(), dir.display());

    let merged = if renumber {
        merge_renumbered(stores)
    } else {
        let mut stores = stores.into_iter();
        let first = stores.next().unwrap_or_default();
        stores.try_fold(first, combine)?
    };

    info!(
        "Merged store: {} images, {} annotations, {} categories",
        merged.images.len(),
        merged.annotations.len(),
        merged.categories.len()
    );

    coco::write(output, &merged)?;
    Ok(merged)
}
