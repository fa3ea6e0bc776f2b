//! Incremental update of an existing train/val split
//!
//! An update runs three stages in order, and any failure stops the run:
//!
//! 1. validate: every image of the new batch exists in the new image directory
//! 2. split-new: the new batch is split into `new_train`/`new_val` inside a
//!    fresh timestamped run directory
//! 3. combine: the existing stores and the new halves are unioned into
//!    `train/train.json` and `val/val.json`
//!
//! Nothing is created under the results root before validation passes and
//! the new batch is partitioned. If combine fails, the split-new artifacts
//! stay on disk for inspection.
//!
//! Running two updates against the same existing split at the same time is
//! not supported; the last writer wins.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::coco::{self, AnnotationStore};
use crate::config::SplitConfig;
use crate::dataset::{write_split, ImageRelocation, SplitReport, SplitRequest};
use crate::error::{CocoError, CocoResult};
use crate::filter::normalize;
use crate::merge::combine;
use crate::partition::partition;
use crate::relocate::{relocate_directory, RelocationReport};
use crate::utils::{create_output_directory, create_timestamped_directory};
use crate::validate::validate_images;

const NEW_TRAIN_IMAGES: &str = "new_train_images";
const NEW_VAL_IMAGES: &str = "new_val_images";

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub new_ann_path: PathBuf,
    pub train_ann_path: PathBuf,
    pub val_ann_path: PathBuf,
    pub config: SplitConfig,
    pub new_image_dir: Option<PathBuf>,
    pub results_root: PathBuf,
}

/// Paths of one update run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLayout {
    pub root: PathBuf,
    pub new_train_ann: PathBuf,
    pub new_val_ann: PathBuf,
    pub new_train_images: PathBuf,
    pub new_val_images: PathBuf,
    pub train_ann: PathBuf,
    pub val_ann: PathBuf,
}

impl RunLayout {
    pub fn new(root: &Path) -> Self {
        let train = root.join("train");
        let val = root.join("val");
        Self {
            root: root.to_path_buf(),
            new_train_ann: train.join("ann").join("new_train.json"),
            new_val_ann: val.join("ann").join("new_val.json"),
            new_train_images: train.join("images").join(NEW_TRAIN_IMAGES),
            new_val_images: val.join("images").join(NEW_VAL_IMAGES),
            train_ann: train.join("train.json"),
            val_ann: val.join("val.json"),
        }
    }

    fn create_directories(&self) -> CocoResult<()> {
        for path in [&self.new_train_ann, &self.new_val_ann] {
            if let Some(parent) = path.parent() {
                create_output_directory(parent)?;
            }
        }
        create_output_directory(&self.new_train_images)?;
        create_output_directory(&self.new_val_images)?;
        Ok(())
    }
}

/// Parameters and outputs of one update run.
///
/// Returned by [`update`]; callers may persist it with [`UpdateRecord::save`]
/// and hand it to [`PostUpdateRequest::from_record`] later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub time_created: String,
    pub new_ann_path: PathBuf,
    pub new_image_locate: Option<PathBuf>,
    pub train_ann_path: PathBuf,
    pub val_ann_path: PathBuf,
    pub split_ratio: f64,
    pub seed: Option<u64>,
    pub run: RunLayout,
}

impl UpdateRecord {
    pub fn save(&self, path: &Path) -> CocoResult<()> {
        let file = File::create(path).map_err(|e| CocoError::io(path, e))?;
        serde_yaml::to_writer(BufWriter::new(file), self).map_err(|source| CocoError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Update configuration saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> CocoResult<Self> {
        let file = File::open(path).map_err(|e| CocoError::io(path, e))?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|source| CocoError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub record: UpdateRecord,
    pub split: SplitReport,
    pub train: AnnotationStore,
    pub val: AnnotationStore,
}

/// Split a new batch and merge it into an existing train/val split.
pub fn update(request: &UpdateRequest) -> CocoResult<UpdateOutcome> {
    // Update always splits at random.
    let config = request.config.clone().stratified(false);
    config.validate()?;

    // Stage 1: validate
    let new_store = coco::load(&request.new_ann_path)?;
    if let Some(image_dir) = &request.new_image_dir {
        let validation = validate_images(&new_store, image_dir);
        if !validation.missing.is_empty() {
            return Err(CocoError::Validation {
                ann_path: request.new_ann_path.clone(),
                image_dir: image_dir.clone(),
                missing: validation.missing,
            });
        }
        info!(
            "All {} images of {} found in {}",
            new_store.images.len(),
            request.new_ann_path.display(),
            image_dir.display()
        );
    } else {
        warn!(
            "No image directory given, skipping image validation of {}",
            request.new_ann_path.display()
        );
    }
    for path in [&request.train_ann_path, &request.val_ann_path] {
        if !path.is_file() {
            return Err(CocoError::MissingDirectory(path.clone()));
        }
    }

    // Stage 2: split-new. Partition before creating anything on disk.
    let outcome = partition(&new_store, &config)?;
    let root = create_timestamped_directory(&request.results_root)?;
    let run = RunLayout::new(&root);
    run.create_directories()?;
    info!("Update run directory: {}", root.display());

    let split_request = SplitRequest {
        ann_path: request.new_ann_path.clone(),
        train_path: run.new_train_ann.clone(),
        test_path: run.new_val_ann.clone(),
        config: config.clone(),
        images: request.new_image_dir.as_ref().map(|dir| ImageRelocation {
            source_dir: dir.clone(),
            train_dir: run.new_train_images.clone(),
            test_dir: run.new_val_images.clone(),
        }),
    };
    let split = write_split(&new_store, outcome, &split_request)?;

    // Stage 3: combine
    let train = combine_into(&request.train_ann_path, &run.new_train_ann, &run.train_ann)?;
    let val = combine_into(&request.val_ann_path, &run.new_val_ann, &run.val_ann)?;

    let record = UpdateRecord {
        time_created: chrono::Local::now().to_rfc3339(),
        new_ann_path: request.new_ann_path.clone(),
        new_image_locate: request.new_image_dir.clone(),
        train_ann_path: request.train_ann_path.clone(),
        val_ann_path: request.val_ann_path.clone(),
        split_ratio: config.ratio,
        seed: config.seed,
        run,
    };
    Ok(UpdateOutcome {
        record,
        split,
        train,
        val,
    })
}

fn combine_into(existing: &Path, new: &Path, output: &Path) -> CocoResult<AnnotationStore> {
    let combined = normalize(combine(coco::load(existing)?, coco::load(new)?)?);
    coco::write(output, &combined)?;
    Ok(combined)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostUpdateRequest {
    /// Holds `train_images/` and `val_images/` of the existing split.
    pub existing_samples_dir: PathBuf,
    /// Run directory of a finished update.
    pub results_path: PathBuf,
    /// A timestamped output directory is created below this one.
    pub output_root: PathBuf,
}

impl PostUpdateRequest {
    /// The existing samples directory is the one holding the existing train file.
    pub fn from_record(record: &UpdateRecord, output_root: &Path) -> Self {
        Self {
            existing_samples_dir: record
                .train_ann_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            results_path: record.run.root.clone(),
            output_root: output_root.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostUpdateOutcome {
    pub train_ann: PathBuf,
    pub train_images: PathBuf,
    pub val_ann: PathBuf,
    pub val_images: PathBuf,
    pub relocation: RelocationReport,
}

/// Gather the combined stores and the new plus existing images of an update
/// run into one output directory.
pub fn post_update(request: &PostUpdateRequest) -> CocoResult<PostUpdateOutcome> {
    let run = RunLayout::new(&request.results_path);
    let prev_train_images = request.existing_samples_dir.join("train_images");
    let prev_val_images = request.existing_samples_dir.join("val_images");

    for dir in [
        &run.new_train_images,
        &prev_train_images,
        &run.new_val_images,
        &prev_val_images,
    ] {
        if !dir.is_dir() {
            return Err(CocoError::MissingDirectory(dir.clone()));
        }
    }
    for file in [&run.train_ann, &run.val_ann] {
        if !file.is_file() {
            return Err(CocoError::MissingDirectory(file.clone()));
        }
    }
    let train = normalize(coco::load(&run.train_ann)?);
    let val = normalize(coco::load(&run.val_ann)?);

    let out = create_timestamped_directory(&request.output_root)?;
    let train_images = create_output_directory(&out.join("train_images"))?;
    let val_images = create_output_directory(&out.join("val_images"))?;

    let mut relocation = RelocationReport::default();
    for (source, dest) in [
        (&run.new_train_images, &train_images),
        (&prev_train_images, &train_images),
        (&run.new_val_images, &val_images),
        (&prev_val_images, &val_images),
    ] {
        info!("Copying {} into {}", source.display(), dest.display());
        relocation.merge(relocate_directory(source, dest)?);
    }
    relocation.print_summary("post-update");

    let train_ann = out.join("train.json");
    let val_ann = out.join("val.json");
    coco::write(&train_ann, &train)?;
    coco::write(&val_ann, &val)?;
    info!("Post-processing completed: {}", out.display());

    Ok(PostUpdateOutcome {
        train_ann,
        train_images,
        val_ann,
        val_images,
        relocation,
    })
}
