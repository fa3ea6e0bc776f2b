//! COCO dataset maintenance
//!
//! Splits COCO annotation files into train/test partitions that stay
//! referentially consistent, copies the matching images, and merges newly
//! collected batches into an existing split.

pub mod categories;
pub mod coco;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod format;
pub mod merge;
pub mod partition;
pub mod relocate;
pub mod separate;
pub mod update;
pub mod utils;
pub mod validate;

// Re-export commonly used types and functions
pub use coco::{Annotation, AnnotationStore, Category, Image};
pub use config::{Cli, Commands, ImageAssignment, SplitConfig};
pub use dataset::{split_dataset, write_split, ImageRelocation, SplitReport, SplitRequest};
pub use error::{CocoError, CocoResult};
pub use partition::{partition, Partition, SplitOutcome};
pub use relocate::{relocate, RelocationOutcome, RelocationReport};
pub use update::{post_update, update, PostUpdateRequest, UpdateRecord, UpdateRequest};
pub use validate::{validate_images, ImageValidation};
