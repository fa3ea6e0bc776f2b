//! COCO annotation store data structures
//!
//! An [`AnnotationStore`] is one COCO JSON document held in memory. Only the
//! fields the pipeline reasons about are typed; everything else rides along in
//! `extra` maps so a load/write cycle never drops unknown COCO extensions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{CocoError, CocoResult};

/// Top-level keys every store must carry.
pub const REQUIRED_KEYS: &[&str] = &["images", "annotations", "categories"];

/// Free-form metadata map. Keys serialize in sorted order.
pub type Extra = Map<String, Value>;

/// COCO image record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Image {
    pub fn new(id: u64, file_name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            width: Some(width),
            height: Some(height),
            extra: Extra::new(),
        }
    }
}

/// COCO annotation record
///
/// Geometry is kept as raw JSON: the pipeline filters annotations but never
/// interprets `bbox`, `segmentation`, `area` or `iscrowd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub bbox: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub segmentation: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub area: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub iscrowd: Value,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Annotation {
    pub fn new(id: u64, image_id: u64, category_id: u64) -> Self {
        Self {
            id,
            image_id,
            category_id,
            bbox: Value::Null,
            segmentation: Value::Null,
            area: Value::Null,
            iscrowd: Value::Null,
            extra: Extra::new(),
        }
    }

    /// True for `[]`, `[[]]` and any list made only of empty polygons.
    pub fn has_empty_segmentation(&self) -> bool {
        match &self.segmentation {
            Value::Array(parts) => parts
                .iter()
                .all(|part| matches!(part, Value::Array(points) if points.is_empty())),
            _ => false,
        }
    }
}

/// COCO category record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Category {
    pub fn new(id: u64, name: impl Into<String>, supercategory: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            supercategory: supercategory.into(),
            extra: Extra::new(),
        }
    }
}

/// Complete COCO document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStore {
    #[serde(default)]
    pub info: Extra,
    #[serde(default)]
    pub licenses: Vec<Value>,
    pub images: Vec<Image>,
    pub annotations: Vec<Annotation>,
    pub categories: Vec<Category>,
}

/// Read a COCO document from `path`.
///
/// Fails with [`CocoError::MalformedStore`] when the document is not a JSON
/// object or lacks one of [`REQUIRED_KEYS`]. `info` and `licenses` default to
/// empty when absent.
pub fn load(path: &Path) -> CocoResult<AnnotationStore> {
    let file = File::open(path).map_err(|e| CocoError::io(path, e))?;
    let value: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| CocoError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let object = match &value {
        Value::Object(object) => object,
        other => {
            return Err(CocoError::MalformedStore {
                path: path.to_path_buf(),
                reason: format!("expected a JSON object, found {}", json_kind(other)),
            })
        }
    };
    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(CocoError::MalformedStore {
            path: path.to_path_buf(),
            reason: format!("missing top-level key(s): {}", missing.join(", ")),
        });
    }

    let store: AnnotationStore =
        serde_json::from_value(value).map_err(|e| CocoError::MalformedStore {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    log::debug!(
        "Loaded {}: {} images, {} annotations, {} categories",
        path.display(),
        store.images.len(),
        store.annotations.len(),
        store.categories.len()
    );
    Ok(store)
}

/// Serialize `store` to `path`, replacing any existing file.
///
/// Output is deterministic: typed fields in declaration order, passthrough
/// keys sorted. The parent directory must already exist.
pub fn write(path: &Path, store: &AnnotationStore) -> CocoResult<()> {
    let file = File::create(path).map_err(|e| CocoError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, store).map_err(|source| CocoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| CocoError::io(path, e))?;
    log::info!(
        "Wrote {} ({} images, {} annotations)",
        path.display(),
        store.images.len(),
        store.annotations.len()
    );
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
