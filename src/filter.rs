//! Referential and category filters
//!
//! Every function here is a stable filter: output order follows input order.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::coco::{Annotation, AnnotationStore, Category, Image};

/// Minimum number of annotations a category needs to be split two ways.
pub const MIN_STRATIFIED_SAMPLES: usize = 2;

/// Images that at least one annotation points at.
pub fn images_with_annotations<'a>(
    images: &'a [Image],
    annotations: &[Annotation],
) -> Vec<&'a Image> {
    let referenced: HashSet<u64> = annotations.iter().map(|a| a.image_id).collect();
    images
        .iter()
        .filter(|image| referenced.contains(&image.id))
        .collect()
}

/// Annotations whose `image_id` belongs to `images`.
pub fn annotations_for_images<'a, 'b, I>(annotations: &'a [Annotation], images: I) -> Vec<&'a Annotation>
where
    I: IntoIterator<Item = &'b Image>,
{
    let ids: HashSet<u64> = images.into_iter().map(|image| image.id).collect();
    annotations
        .iter()
        .filter(|ann| ids.contains(&ann.image_id))
        .collect()
}

/// Number of annotations per category id.
pub fn category_counts<'a, I>(annotations: I) -> BTreeMap<u64, usize>
where
    I: IntoIterator<Item = &'a Annotation>,
{
    let mut counts = BTreeMap::new();
    for ann in annotations {
        *counts.entry(ann.category_id).or_insert(0) += 1;
    }
    counts
}

/// Result of the category viability pass.
#[derive(Debug)]
pub struct ViableSubset<'a> {
    pub annotations: Vec<&'a Annotation>,
    pub categories: Vec<&'a Category>,
    /// Category ids removed for having fewer than [`MIN_STRATIFIED_SAMPLES`] annotations.
    pub dropped: Vec<u64>,
}

/// Drop every category with fewer than two annotations, together with the
/// annotations referencing it. Categories that never occur in `annotations`
/// are dropped as well.
pub fn viable_categories<'a>(
    annotations: &[&'a Annotation],
    categories: &'a [Category],
) -> ViableSubset<'a> {
    let counts = category_counts(annotations.iter().copied());
    let is_viable = |id: u64| counts.get(&id).copied().unwrap_or(0) >= MIN_STRATIFIED_SAMPLES;

    let mut dropped: Vec<u64> = counts
        .keys()
        .copied()
        .filter(|&id| !is_viable(id))
        .collect();
    for category in categories {
        if !counts.contains_key(&category.id) {
            dropped.push(category.id);
        }
    }
    dropped.sort_unstable();
    dropped.dedup();

    ViableSubset {
        annotations: annotations
            .iter()
            .copied()
            .filter(|ann| is_viable(ann.category_id))
            .collect(),
        categories: categories.iter().filter(|c| is_viable(c.id)).collect(),
        dropped,
    }
}

/// Restore referential closure on a store assembled from several sources.
///
/// Empty segmentation placeholders (`[[]]`) become `[]`, annotations pointing at
/// unknown images or categories are removed, and images left without any
/// annotation are removed.
pub fn normalize(store: AnnotationStore) -> AnnotationStore {
    let AnnotationStore {
        info,
        licenses,
        images,
        annotations,
        categories,
    } = store;

    let image_ids: HashSet<u64> = images.iter().map(|i| i.id).collect();
    let category_ids: HashSet<u64> = categories.iter().map(|c| c.id).collect();

    let before = annotations.len();
    let annotations: Vec<Annotation> = annotations
        .into_iter()
        .filter(|ann| image_ids.contains(&ann.image_id) && category_ids.contains(&ann.category_id))
        .map(|mut ann| {
            if ann.has_empty_segmentation() {
                ann.segmentation = Value::Array(Vec::new());
            }
            ann
        })
        .collect();
    if annotations.len() != before {
        log::warn!(
            "Dropped {} annotation(s) with dangling image or category references",
            before - annotations.len()
        );
    }

    let images: Vec<Image> = images_with_annotations(&images, &annotations)
        .into_iter()
        .cloned()
        .collect();

    AnnotationStore {
        info,
        licenses,
        images,
        annotations,
        categories,
    }
}
