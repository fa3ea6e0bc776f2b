use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CocoError, CocoResult};

pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;

/// Command-line interface for maintaining COCO datasets.
#[derive(Parser, Debug, Clone)]
#[command(name = "cvops", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Split a COCO file into train and test files
    Split(SplitArgs),
    /// Split a new batch and merge it into an existing train/val split
    Update(UpdateArgs),
    /// Consolidate the images and annotations produced by `update`
    Postupdate(PostUpdateArgs),
    /// Check that every image of a COCO file exists in a directory
    Validate(ValidateArgs),
    /// Merge every COCO file in a directory into one file
    Merge(MergeArgs),
    /// Remove the categories listed under `delete` in a YAML config
    Delete(CategoryArgs),
    /// Rename and merge categories following the `process` map in a YAML config
    Remap(CategoryArgs),
    /// Split a COCO file into one file per file-name key
    SeparateByName(SeparateArgs),
    /// Change the extension of every image file name in a COCO file
    ReplaceImgFormat(ReplaceFormatArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    /// Path to the COCO annotations file
    pub ann_path: PathBuf,

    /// Where to store the training annotations
    pub train_path: PathBuf,

    /// Where to store the test annotations
    pub test_path: PathBuf,

    /// Fraction of the data that goes to the training set
    #[arg(default_value_t = DEFAULT_SPLIT_RATIO, value_parser = validate_ratio)]
    pub ratio: f64,

    /// Directory holding the images; when given, images are copied next to each split
    pub image_locate: Option<PathBuf>,

    /// Balance per-category annotation counts across the two sets
    #[arg(long)]
    pub stratified: bool,

    /// List an image in every set that holds one of its annotations (stratified only)
    #[arg(long = "shared-images", requires = "stratified")]
    pub shared_images: bool,

    /// Put image folders beside the annotation files instead of the pipeline layout
    #[arg(long)]
    pub independent: bool,

    /// Seed for random shuffling
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Path to the new, unsplit COCO annotations file
    pub new_ann_path: PathBuf,

    /// Path to the existing train annotations file
    pub train_ann_path: PathBuf,

    /// Path to the existing validation annotations file
    pub val_ann_path: PathBuf,

    /// Fraction of the new data that goes to the training set
    #[arg(default_value_t = DEFAULT_SPLIT_RATIO, value_parser = validate_ratio)]
    pub split_ratio: f64,

    /// Directory holding the images of the new batch
    pub new_image_locate: Option<PathBuf>,

    /// Directory under which a timestamped run directory is created
    #[arg(long = "results-root", default_value = "results")]
    pub results_root: PathBuf,

    /// Write the run parameters to this YAML file for a later `postupdate`
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Seed for random shuffling
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct PostUpdateArgs {
    /// Read the directories from a record written by `update --record`
    #[arg(long, conflicts_with_all = ["existing_samples_dir", "results_path"])]
    pub record: Option<PathBuf>,

    /// Directory holding `train_images/` and `val_images/` of the existing split
    #[arg(long = "existing-samples-dir", required_unless_present = "record")]
    pub existing_samples_dir: Option<PathBuf>,

    /// Run directory produced by `update`
    #[arg(long = "results-path", required_unless_present = "record")]
    pub results_path: Option<PathBuf>,

    /// Directory under which a timestamped output directory is created
    #[arg(long = "output-root", default_value = "processed_results")]
    pub output_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Directory of image files
    pub img_path: PathBuf,

    /// Path to the COCO annotations file
    pub ann_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Directory of COCO annotation files (`*.json`)
    pub ann_dir: PathBuf,

    /// Where to write the merged file
    pub output: PathBuf,

    /// Renumber image and annotation ids and unify categories by name
    #[arg(long)]
    pub renumber: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CategoryArgs {
    /// Path to the category YAML config
    pub config: PathBuf,

    /// Path to the COCO annotations file
    pub ann_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SeparateArgs {
    /// Directory of image files
    pub img_path: PathBuf,

    /// Path to the COCO annotations file
    pub ann_path: PathBuf,

    /// Substrings of the image file names, one output file per key
    #[arg(required = true)]
    pub name_keys: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ReplaceFormatArgs {
    /// COCO annotations file, rewritten in place
    pub annotation: PathBuf,

    /// New image extension, e.g. `png`
    pub format: String,
}

/// How a stratified split places images whose annotations landed on both sides.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageAssignment {
    /// The image and all of its annotations follow the side holding most of
    /// its annotations; ties go to the side of its first annotation.
    #[default]
    Majority,
    /// Annotations stay where they were assigned and the image is listed on
    /// every side that holds one of them.
    Shared,
}

/// Parameters of one split.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub ratio: f64,
    pub stratified: bool,
    pub seed: Option<u64>,
    pub image_assignment: ImageAssignment,
}

impl SplitConfig {
    pub fn new(ratio: f64) -> CocoResult<Self> {
        let config = Self {
            ratio,
            stratified: false,
            seed: None,
            image_assignment: ImageAssignment::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn stratified(mut self, stratified: bool) -> Self {
        self.stratified = stratified;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_image_assignment(mut self, assignment: ImageAssignment) -> Self {
        self.image_assignment = assignment;
        self
    }

    pub fn validate(&self) -> CocoResult<()> {
        if self.ratio > 0.0 && self.ratio < 1.0 {
            Ok(())
        } else {
            Err(CocoError::InvalidRatio(self.ratio))
        }
    }
}

/// Category maintenance config, e.g.
///
/// ```yaml
/// delete: [weed]
/// process:
///   ripe_fruit: fruit
///   unripe_fruit: fruit
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryConfig {
    #[serde(default)]
    pub delete: Vec<String>,
    #[serde(default)]
    pub process: BTreeMap<String, String>,
}

impl CategoryConfig {
    pub fn from_path(path: &Path) -> CocoResult<Self> {
        let file = File::open(path).map_err(|e| CocoError::io(path, e))?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|source| CocoError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

// Validate that the ratio lies strictly between 0 and 1
fn validate_ratio(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if val > 0.0 && val < 1.0 => Ok(val),
        _ => Err("RATIO must be a number in (0, 1)".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ratio() {
        assert!(validate_ratio("0.8").is_ok());
        assert!(validate_ratio("0.01").is_ok());
        assert!(validate_ratio("0.0").is_err());
        assert!(validate_ratio("1.0").is_err());
        assert!(validate_ratio("-0.3").is_err());
        assert!(validate_ratio("abc").is_err());
    }

    #[test]
    fn test_split_config_rejects_bad_ratio() {
        assert!(matches!(SplitConfig::new(1.0), Err(CocoError::InvalidRatio(_))));
        assert!(matches!(SplitConfig::new(0.0), Err(CocoError::InvalidRatio(_))));
        assert!(matches!(SplitConfig::new(f64::NAN), Err(CocoError::InvalidRatio(_))));
        let config = SplitConfig::new(0.7).unwrap().stratified(true).with_seed(Some(3));
        assert!(config.stratified);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.image_assignment, ImageAssignment::Majority);
    }

    #[test]
    fn test_cli_parses_split_defaults() {
        let cli = Cli::try_parse_from(["cvops", "split", "all.json", "train.json", "test.json"]).unwrap();
        match cli.command {
            Commands::Split(args) => {
                assert_eq!(args.ratio, DEFAULT_SPLIT_RATIO);
                assert!(args.image_locate.is_none());
                assert!(!args.stratified);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_bad_ratio() {
        assert!(Cli::try_parse_from(["cvops", "split", "a.json", "b.json", "c.json", "1.5"]).is_err());
    }

    #[test]
    fn test_cli_postupdate_needs_record_or_directories() {
        assert!(Cli::try_parse_from(["cvops", "postupdate"]).is_err());
        assert!(Cli::try_parse_from(["cvops", "postupdate", "--record", "run.yaml"]).is_ok());
        assert!(Cli::try_parse_from([
            "cvops",
            "postupdate",
            "--existing-samples-dir",
            "existing",
            "--results-path",
            "results/1",
        ])
        .is_ok());
        assert!(Cli::try_parse_from([
            "cvops",
            "postupdate",
            "--record",
            "run.yaml",
            "--results-path",
            "results/1",
        ])
        .is_err());
    }

    #[test]
    fn test_cli_parses_separate_and_replace() {
        let cli = Cli::try_parse_from(["cvops", "separate-by-name", "imgs", "ann.json", "farm_a", "farm_b"])
            .unwrap();
        match cli.command {
            Commands::SeparateByName(args) => assert_eq!(args.name_keys, vec!["farm_a", "farm_b"]),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["cvops", "separate-by-name", "imgs", "ann.json"]).is_err());

        let cli = Cli::try_parse_from(["cvops", "replace-img-format", "ann.json", "png"]).unwrap();
        assert!(matches!(cli.command, Commands::ReplaceImgFormat(args) if args.format == "png"));
    }

    #[test]
    fn test_category_config_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cats.yaml");
        std::fs::write(&path, "delete:\n  - weed\nprocess:\n  ripe: fruit\n").unwrap();

        let config = CategoryConfig::from_path(&path).unwrap();
        assert_eq!(config.delete, vec!["weed".to_string()]);
        assert_eq!(config.process["ripe"], "fruit");
    }
}
