//! Category maintenance: deleting and remapping categories by name

use log::{info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::coco::{self, AnnotationStore, Category};
use crate::config::CategoryConfig;
use crate::error::CocoResult;
use crate::utils::sibling_with_suffix;

/// Drop the categories whose name is in `names`, together with their
/// annotations. Images and remaining ids are left untouched.
pub fn delete_categories(mut store: AnnotationStore, names: &[String]) -> AnnotationStore {
    let names: HashSet<&str> = names.iter().map(String::as_str).collect();
    let removed: HashSet<u64> = store
        .categories
        .iter()
        .filter(|c| names.contains(c.name.as_str()))
        .map(|c| c.id)
        .collect();

    for name in &names {
        if !store.categories.iter().any(|c| c.name == *name) {
            warn!("Category {} not found, nothing to delete", name);
        }
    }

    store.categories.retain(|c| !removed.contains(&c.id));
    let before = store.annotations.len();
    store.annotations.retain(|a| !removed.contains(&a.category_id));
    info!(
        "Deleted {} categories and {} annotations",
        removed.len(),
        before - store.annotations.len()
    );
    store
}

/// Rename categories following `renames` and renumber them from 0.
///
/// Categories mapped to the same name are collapsed into one. New ids follow
/// the order in which each resulting name first appears; categories absent
/// from `renames` keep their name.
pub fn remap_categories(
    mut store: AnnotationStore,
    renames: &BTreeMap<String, String>,
) -> AnnotationStore {
    let mut id_by_name: HashMap<String, u64> = HashMap::new();
    let mut id_map: HashMap<u64, u64> = HashMap::new();
    let mut categories: Vec<Category> = Vec::new();

    for category in store.categories {
        let name = renames
            .get(&category.name)
            .cloned()
            .unwrap_or_else(|| category.name.clone());
        let new_id = match id_by_name.get(&name) {
            Some(&id) => id,
            None => {
                let id = categories.len() as u64;
                id_by_name.insert(name.clone(), id);
                categories.push(Category {
                    id,
                    name,
                    ..category.clone()
                });
                id
            }
        };
        id_map.insert(category.id, new_id);
    }

    let mut dangling = 0usize;
    store.annotations.retain_mut(|ann| match id_map.get(&ann.category_id) {
        Some(&id) => {
            ann.category_id = id;
            true
        }
        None => {
            dangling += 1;
            false
        }
    });
    if dangling > 0 {
        warn!("Dropped {} annotations with unknown category ids", dangling);
    }

    info!("Remapped {} categories into {}", id_map.len(), categories.len());
    store.categories = categories;
    store
}

/// Apply the config's `delete` list to `ann_path`, writing `<stem>_delete.json`.
///
/// Returns `None` and writes nothing when none of the listed names is a
/// category of the store.
pub fn delete_file(config: &CategoryConfig, ann_path: &Path) -> CocoResult<Option<PathBuf>> {
    let store = coco::load(ann_path)?;
    if !store
        .categories
        .iter()
        .any(|c| config.delete.contains(&c.name))
    {
        info!("Nothing to be removed from {}", ann_path.display());
        return Ok(None);
    }
    let store = delete_categories(store, &config.delete);
    let output = sibling_with_suffix(ann_path, "_delete");
    coco::write(&output, &store)?;
    Ok(Some(output))
}

/// Apply the config's `process` map to `ann_path`, writing `<stem>_process.json`.
pub fn remap_file(config: &CategoryConfig, ann_path: &Path) -> CocoResult<PathBuf> {
    let store = remap_categories(coco::load(ann_path)?, &config.process);
    let output = sibling_with_suffix(ann_path, "_process");
    coco::write(&output, &store)?;
    Ok(output)
}
