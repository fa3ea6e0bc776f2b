use log::info;
use std::path::{Path, PathBuf};

use crate::coco::{self, AnnotationStore};
use crate::config::SplitConfig;
use crate::error::CocoResult;
use crate::partition::{partition, SplitOutcome};
use crate::relocate::{relocate, RelocationReport};

/// Where the images of each side of a split are copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRelocation {
    pub source_dir: PathBuf,
    pub train_dir: PathBuf,
    pub test_dir: PathBuf,
}

impl ImageRelocation {
    /// `<root>/images/new_train_images` and `<root>/images/new_val_images`,
    /// where `<root>` is two levels above the train annotation file.
    pub fn pipeline_layout(source_dir: &Path, train_path: &Path, test_path: &Path) -> Self {
        let root_of = |path: &Path| {
            path.parent()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .unwrap_or_default()
        };
        Self {
            source_dir: source_dir.to_path_buf(),
            train_dir: root_of(train_path).join("images").join("new_train_images"),
            test_dir: root_of(test_path).join("images").join("new_val_images"),
        }
    }

    /// `train_images/` beside the train file and `val_images/` beside the test file.
    pub fn independent_layout(source_dir: &Path, train_path: &Path, test_path: &Path) -> Self {
        let dir_of = |path: &Path| path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            source_dir: source_dir.to_path_buf(),
            train_dir: dir_of(train_path).join("train_images"),
            test_dir: dir_of(test_path).join("val_images"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub ann_path: PathBuf,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub config: SplitConfig,
    pub images: Option<ImageRelocation>,
}

#[derive(Debug, Default, Clone)]
pub struct SplitReport {
    pub train_images: usize,
    pub train_annotations: usize,
    pub test_images: usize,
    pub test_annotations: usize,
    pub dropped_categories: Vec<u64>,
    pub train_relocation: Option<RelocationReport>,
    pub test_relocation: Option<RelocationReport>,
}

impl SplitReport {
    /// Relocation failures of both sides.
    pub fn relocation_failures(&self) -> usize {
        [&self.train_relocation, &self.test_relocation]
            .into_iter()
            .flatten()
            .map(|report| report.failures().len())
            .sum()
    }
}

/// Load, partition and write a split, then copy images if requested.
///
/// Nothing is written unless partitioning succeeds. Image copy failures are
/// reported in the returned [`SplitReport`] and do not fail the split.
pub fn split_dataset(request: &SplitRequest) -> CocoResult<SplitReport> {
    request.config.validate()?;
    let store = coco::load(&request.ann_path)?;
    info!(
        "Read {} images and {} annotations from {}",
        store.images.len(),
        store.annotations.len(),
        request.ann_path.display()
    );

    let outcome = partition(&store, &request.config)?;
    write_split(&store, outcome, request)
}

/// Write both sides of an already partitioned `store` and copy their images.
pub fn write_split(
    store: &AnnotationStore,
    outcome: SplitOutcome<'_>,
    request: &SplitRequest,
) -> CocoResult<SplitReport> {
    let train_files = outcome.train.file_names();
    let test_files = outcome.test.file_names();
    let dropped_categories = outcome.dropped_categories.clone();
    let (train, test) = outcome.into_stores(store);

    coco::write(&request.train_path, &train)?;
    coco::write(&request.test_path, &test)?;

    let mut report = SplitReport {
        train_images: train.images.len(),
        train_annotations: train.annotations.len(),
        test_images: test.images.len(),
        test_annotations: test.annotations.len(),
        dropped_categories,
        ..Default::default()
    };

    if let Some(images) = &request.images {
        info!("Copying train images to {}", images.train_dir.display());
        let train_report = relocate(&train_files, &images.source_dir, &images.train_dir)?;
        train_report.print_summary("train");
        info!("Copying test images to {}", images.test_dir.display());
        let test_report = relocate(&test_files, &images.source_dir, &images.test_dir)?;
        test_report.print_summary("test");
        report.train_relocation = Some(train_report);
        report.test_relocation = Some(test_report);
    }

    info!(
        "Saved {} annotations in {} and {} in {}",
        report.train_annotations,
        request.train_path.display(),
        report.test_annotations,
        request.test_path.display()
    );
    Ok(report)
}
