//! Train/test partitioning of an annotation store
//!
//! Simple mode shuffles images and cuts the list at `round(ratio * N)`.
//! Stratified mode works on annotations: it repeatedly hands the test side one
//! annotation of the category furthest below its desired test share, until the
//! test side holds `round((1 - ratio) * total)` annotations. Images are then
//! resolved according to [`ImageAssignment`].

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::coco::{Annotation, AnnotationStore, Category, Image};
use crate::config::{ImageAssignment, SplitConfig};
use crate::error::{CocoError, CocoResult};
use crate::filter::{annotations_for_images, images_with_annotations, viable_categories};

/// One side of a split, borrowing from the source store.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub images: Vec<&'a Image>,
    pub annotations: Vec<&'a Annotation>,
}

impl<'a> Partition<'a> {
    pub fn image_ids(&self) -> HashSet<u64> {
        self.images.iter().map(|image| image.id).collect()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.images.iter().map(|image| image.file_name.clone()).collect()
    }
}

/// Both sides of a split plus the categories they are written with.
#[derive(Debug)]
pub struct SplitOutcome<'a> {
    pub train: Partition<'a>,
    pub test: Partition<'a>,
    pub categories: Vec<&'a Category>,
    /// Categories removed by the viability filter (stratified mode only).
    pub dropped_categories: Vec<u64>,
}

impl<'a> SplitOutcome<'a> {
    /// Materialize independent train and test stores.
    pub fn into_stores(self, source: &AnnotationStore) -> (AnnotationStore, AnnotationStore) {
        let categories: Vec<Category> = self.categories.into_iter().cloned().collect();
        let build = |partition: Partition<'a>| AnnotationStore {
            info: source.info.clone(),
            licenses: source.licenses.clone(),
            images: partition.images.into_iter().cloned().collect(),
            annotations: partition.annotations.into_iter().cloned().collect(),
            categories: categories.clone(),
        };
        (build(self.train), build(self.test))
    }
}

/// Split `store` according to `config`.
pub fn partition<'a>(store: &'a AnnotationStore, config: &SplitConfig) -> CocoResult<SplitOutcome<'a>> {
    config.validate()?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    if config.stratified {
        stratified_split(store, config, &mut rng)
    } else {
        simple_split(store, config.ratio, &mut rng)
    }
}

fn simple_split<'a>(
    store: &'a AnnotationStore,
    ratio: f64,
    rng: &mut StdRng,
) -> CocoResult<SplitOutcome<'a>> {
    let images = images_with_annotations(&store.images, &store.annotations);
    if images.is_empty() {
        return Err(CocoError::EmptyDataset(
            "no image is referenced by any annotation".to_string(),
        ));
    }

    let n_train = train_count(images.len(), ratio);
    let mut order: Vec<usize> = (0..images.len()).collect();
    order.shuffle(rng);
    let mut in_train = vec![false; images.len()];
    for &index in &order[..n_train] {
        in_train[index] = true;
    }

    let (train_images, test_images): (Vec<_>, Vec<_>) = images
        .into_iter()
        .zip(in_train)
        .partition(|(_, train)| *train);
    let train_images: Vec<&Image> = train_images.into_iter().map(|(image, _)| image).collect();
    let test_images: Vec<&Image> = test_images.into_iter().map(|(image, _)| image).collect();

    log::info!(
        "Random split: {} train / {} test images",
        train_images.len(),
        test_images.len()
    );

    Ok(SplitOutcome {
        train: Partition {
            annotations: annotations_for_images(&store.annotations, train_images.iter().copied()),
            images: train_images,
        },
        test: Partition {
            annotations: annotations_for_images(&store.annotations, test_images.iter().copied()),
            images: test_images,
        },
        categories: store.categories.iter().collect(),
        dropped_categories: Vec::new(),
    })
}

fn stratified_split<'a>(
    store: &'a AnnotationStore,
    config: &SplitConfig,
    rng: &mut StdRng,
) -> CocoResult<SplitOutcome<'a>> {
    let images = images_with_annotations(&store.images, &store.annotations);
    let annotations = annotations_for_images(&store.annotations, images.iter().copied());
    let viable = viable_categories(&annotations, &store.categories);
    if !viable.dropped.is_empty() {
        log::warn!(
            "Dropping {} categor(ies) with fewer than two annotations: {:?}",
            viable.dropped.len(),
            viable.dropped
        );
    }
    if viable.annotations.is_empty() {
        return Err(CocoError::EmptyDataset(
            "no category has at least two annotations".to_string(),
        ));
    }

    let in_test = assign_annotations(&viable.annotations, config.ratio, rng);
    let (train, test) = match config.image_assignment {
        ImageAssignment::Majority => resolve_by_majority(&images, &viable.annotations, &in_test),
        ImageAssignment::Shared => resolve_shared(&images, &viable.annotations, &in_test),
    };

    log::info!(
        "Stratified split: {} train / {} test annotations over {} / {} images",
        train.annotations.len(),
        test.annotations.len(),
        train.images.len(),
        test.images.len()
    );

    Ok(SplitOutcome {
        train,
        test,
        categories: viable.categories,
        dropped_categories: viable.dropped,
    })
}

/// Number of items that go to the training side.
pub fn train_count(total: usize, ratio: f64) -> usize {
    ((ratio * total as f64).round() as usize).min(total)
}

struct LabelState {
    category_id: u64,
    total: usize,
    desired: f64,
    assigned: usize,
    pool: Vec<usize>,
}

impl LabelState {
    fn deficit(&self) -> f64 {
        self.desired - self.assigned as f64
    }
}

/// Returns, per annotation, whether it goes to the test side.
fn assign_annotations(annotations: &[&Annotation], ratio: f64, rng: &mut StdRng) -> Vec<bool> {
    let test_fraction = 1.0 - ratio;
    let mut pools: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
    for (index, ann) in annotations.iter().enumerate() {
        pools.entry(ann.category_id).or_default().push(index);
    }

    let mut labels: Vec<LabelState> = pools
        .into_iter()
        .map(|(category_id, mut pool)| {
            pool.shuffle(rng);
            LabelState {
                category_id,
                total: pool.len(),
                desired: test_fraction * pool.len() as f64,
                assigned: 0,
                pool,
            }
        })
        .collect();

    let target = annotations.len() - train_count(annotations.len(), ratio);
    let mut in_test = vec![false; annotations.len()];
    for _ in 0..target {
        // Largest deficit first; ties go to the rarer category, then the lower id.
        let next = labels
            .iter_mut()
            .filter(|label| !label.pool.is_empty())
            .min_by(|a, b| {
                b.deficit()
                    .total_cmp(&a.deficit())
                    .then(a.total.cmp(&b.total))
                    .then(a.category_id.cmp(&b.category_id))
            });
        let Some(label) = next else { break };
        if let Some(index) = label.pool.pop() {
            in_test[index] = true;
            label.assigned += 1;
        }
    }
    in_test
}

fn resolve_by_majority<'a>(
    images: &[&'a Image],
    annotations: &[&'a Annotation],
    in_test: &[bool],
) -> (Partition<'a>, Partition<'a>) {
    // (train votes, test votes, side of the first annotation seen)
    let mut votes: HashMap<u64, (usize, usize, bool)> = HashMap::new();
    for (ann, &test) in annotations.iter().zip(in_test) {
        let entry = votes.entry(ann.image_id).or_insert((0, 0, test));
        if test {
            entry.1 += 1;
        } else {
            entry.0 += 1;
        }
    }
    let image_in_test = |image_id: u64| -> Option<bool> {
        votes.get(&image_id).map(|&(train, test, first)| match test.cmp(&train) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => first,
        })
    };

    let mut train = Partition::default();
    let mut test = Partition::default();
    for &image in images {
        match image_in_test(image.id) {
            Some(true) => test.images.push(image),
            Some(false) => train.images.push(image),
            None => {}
        }
    }
    for &ann in annotations {
        match image_in_test(ann.image_id) {
            Some(true) => test.annotations.push(ann),
            Some(false) => train.annotations.push(ann),
            None => {}
        }
    }
    (train, test)
}

fn resolve_shared<'a>(
    images: &[&'a Image],
    annotations: &[&'a Annotation],
    in_test: &[bool],
) -> (Partition<'a>, Partition<'a>) {
    let mut train = Partition::default();
    let mut test = Partition::default();
    for (&ann, &is_test) in annotations.iter().zip(in_test) {
        if is_test {
            test.annotations.push(ann);
        } else {
            train.annotations.push(ann);
        }
    }
    let train_ids: HashSet<u64> = train.annotations.iter().map(|a| a.image_id).collect();
    let test_ids: HashSet<u64> = test.annotations.iter().map(|a| a.image_id).collect();
    for &image in images {
        if train_ids.contains(&image.id) {
            train.images.push(image);
        }
        if test_ids.contains(&image.id) {
            test.images.push(image);
        }
    }
    (train, test)
}
