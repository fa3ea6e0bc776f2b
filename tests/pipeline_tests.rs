use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use cvops::coco::{self, Annotation, AnnotationStore, Category, Image};
use cvops::config::SplitConfig;
use cvops::dataset::{split_dataset, ImageRelocation, SplitRequest};
use cvops::error::CocoError;
use cvops::update::{post_update, update, PostUpdateRequest, RunLayout, UpdateRequest};

fn store_with_images(ids: impl IntoIterator<Item = u64>) -> AnnotationStore {
    let ids: Vec<u64> = ids.into_iter().collect();
    AnnotationStore {
        images: ids
            .iter()
            .map(|&id| Image::new(id, format!("img_{}.jpg", id), 640, 480))
            .collect(),
        annotations: ids
            .iter()
            .map(|&id| Annotation::new(id * 10, id, 1))
            .collect(),
        categories: vec![Category::new(1, "leaf", "plant")],
        ..Default::default()
    }
}

fn write_images(dir: &Path, store: &AnnotationStore) {
    fs::create_dir_all(dir).unwrap();
    for image in &store.images {
        fs::write(dir.join(&image.file_name), image.file_name.as_bytes()).unwrap();
    }
}

fn file_names(dir: &Path) -> HashSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn split_request(dir: &Path, ann_path: PathBuf, config: SplitConfig) -> SplitRequest {
    SplitRequest {
        ann_path,
        train_path: dir.join("train.json"),
        test_path: dir.join("test.json"),
        config,
        images: None,
    }
}

#[test]
fn test_split_writes_disjoint_files() {
    let dir = tempfile::tempdir().unwrap();
    let ann_path = dir.path().join("all.json");
    coco::write(&ann_path, &store_with_images(1..=10)).unwrap();

    let config = SplitConfig::new(0.8).unwrap().with_seed(Some(7));
    let request = split_request(dir.path(), ann_path, config);
    let report = split_dataset(&request).unwrap();
    assert_eq!(report.train_images, 8);
    assert_eq!(report.test_images, 2);

    let train = coco::load(&request.train_path).unwrap();
    let test = coco::load(&request.test_path).unwrap();
    assert_eq!(train.annotations.len(), 8);
    assert_eq!(test.annotations.len(), 2);

    let train_ids: HashSet<u64> = train.images.iter().map(|i| i.id).collect();
    assert!(test.images.iter().all(|i| !train_ids.contains(&i.id)));
    assert!(test
        .annotations
        .iter()
        .all(|a| test.images.iter().any(|i| i.id == a.image_id)));
    assert_eq!(train.categories, test.categories);
}

#[test]
fn test_split_relocation_reports_missing_image() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_images(1..=10);
    let raw = dir.path().join("raw");
    write_images(&raw, &store);
    fs::remove_file(raw.join("img_4.jpg")).unwrap();

    let ann_path = dir.path().join("all.json");
    coco::write(&ann_path, &store).unwrap();

    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    let mut request = split_request(&out, ann_path, SplitConfig::new(0.8).unwrap());
    request.images = Some(ImageRelocation::independent_layout(
        &raw,
        &request.train_path,
        &request.test_path,
    ));

    let report = split_dataset(&request).unwrap();
    assert_eq!(report.relocation_failures(), 1);

    let copied = file_names(&out.join("train_images")).len() + file_names(&out.join("val_images")).len();
    assert_eq!(copied, 9);
}

#[test]
fn test_stratified_split_of_singletons_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = store_with_images(1..=3);
    store.categories = vec![
        Category::new(1, "leaf", "plant"),
        Category::new(2, "fruit", "plant"),
        Category::new(3, "flower", "plant"),
    ];
    for (ann, category_id) in store.annotations.iter_mut().zip([1, 2, 3]) {
        ann.category_id = category_id;
    }
    let ann_path = dir.path().join("all.json");
    coco::write(&ann_path, &store).unwrap();

    let config = SplitConfig::new(0.5).unwrap().stratified(true);
    let request = split_request(dir.path(), ann_path, config);
    let result = split_dataset(&request);

    assert!(matches!(result, Err(CocoError::EmptyDataset(_))));
    assert!(!request.train_path.exists());
    assert!(!request.test_path.exists());
}

#[test]
fn test_rewrite_is_byte_stable() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.json");
    fs::write(
        &source,
        r##"{
  "info": {"year": 2024, "contributor": "field team"},
  "licenses": [{"id": 1, "name": "CC-BY"}],
  "images": [{"id": 1, "file_name": "a.jpg", "width": 4, "height": 3, "date_captured": "2024-05-01"}],
  "annotations": [{"id": 5, "image_id": 1, "category_id": 2, "bbox": [0, 0, 2, 2], "area": 4, "iscrowd": 0, "score": 0.9}],
  "categories": [{"id": 2, "name": "leaf", "supercategory": "plant", "color": "#00ff00"}]
}"##,
    )
    .unwrap();

    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");
    coco::write(&first, &coco::load(&source).unwrap()).unwrap();
    coco::write(&second, &coco::load(&first).unwrap()).unwrap();

    let first_bytes = fs::read(&first).unwrap();
    assert_eq!(first_bytes, fs::read(&second).unwrap());
    let text = String::from_utf8(first_bytes).unwrap();
    assert!(text.contains("date_captured"));
    assert!(text.contains("\"score\""));
    assert!(text.contains("contributor"));
}

struct UpdateFixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    request: UpdateRequest,
}

fn update_fixture() -> UpdateFixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let existing = root.join("existing");
    let existing_train = store_with_images(101..=104);
    let existing_val = store_with_images(201..=202);
    write_images(&existing.join("train_images"), &existing_train);
    write_images(&existing.join("val_images"), &existing_val);
    coco::write(&existing.join("train.json"), &existing_train).unwrap();
    coco::write(&existing.join("val.json"), &existing_val).unwrap();

    let new_store = store_with_images(1..=10);
    let raw = root.join("raw");
    write_images(&raw, &new_store);
    coco::write(&root.join("new.json"), &new_store).unwrap();

    let request = UpdateRequest {
        new_ann_path: root.join("new.json"),
        train_ann_path: existing.join("train.json"),
        val_ann_path: existing.join("val.json"),
        config: SplitConfig::new(0.8).unwrap().with_seed(Some(3)),
        new_image_dir: Some(raw),
        results_root: root.join("results"),
    };
    UpdateFixture {
        _dir: dir,
        root,
        request,
    }
}

#[test]
fn test_update_with_missing_image_creates_nothing() {
    let fixture = update_fixture();
    fs::remove_file(fixture.root.join("raw/img_5.jpg")).unwrap();

    let result = update(&fixture.request);
    match result {
        Err(CocoError::Validation { missing, .. }) => assert_eq!(missing, vec!["img_5.jpg"]),
        other => panic!("expected a validation error, got {:?}", other.map(|_| ())),
    }
    assert!(results_entries(&fixture.request.results_root).is_empty());
}

fn results_entries(results: &Path) -> Vec<PathBuf> {
    if !results.exists() {
        return Vec::new();
    }
    fs::read_dir(results)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[test]
fn test_update_with_unannotated_batch_creates_nothing() {
    let fixture = update_fixture();
    let mut unannotated = store_with_images(1..=2);
    unannotated.annotations.clear();
    coco::write(&fixture.request.new_ann_path, &unannotated).unwrap();

    let result = update(&fixture.request);

    assert!(matches!(result, Err(CocoError::EmptyDataset(_))));
    assert!(results_entries(&fixture.request.results_root).is_empty());
}

#[test]
fn test_update_keeps_split_artifacts_when_combine_fails() {
    let fixture = update_fixture();
    let mut existing_train = coco::load(&fixture.request.train_ann_path).unwrap();
    existing_train.categories = vec![Category::new(1, "stem", "plant")];
    coco::write(&fixture.request.train_ann_path, &existing_train).unwrap();

    let result = update(&fixture.request);
    assert!(matches!(result, Err(CocoError::CategoryConflict { id: 1, .. })));

    let runs = results_entries(&fixture.request.results_root);
    assert_eq!(runs.len(), 1);
    let run = RunLayout::new(&runs[0]);
    assert!(run.new_train_ann.is_file());
    assert!(run.new_val_ann.is_file());
    assert!(!run.train_ann.exists());
}

#[test]
fn test_update_without_image_dir_skips_validation() {
    let mut fixture = update_fixture();
    fs::remove_dir_all(fixture.root.join("raw")).unwrap();
    fixture.request.new_image_dir = None;

    let outcome = update(&fixture.request).unwrap();

    assert_eq!(outcome.train.images.len(), 12);
    assert!(outcome.split.train_relocation.is_none());
    assert!(file_names(&outcome.record.run.new_train_images).is_empty());
}

#[test]
fn test_update_combines_existing_and_new() {
    let fixture = update_fixture();
    let outcome = update(&fixture.request).unwrap();
    let run = &outcome.record.run;

    assert!(run.root.starts_with(&fixture.request.results_root));
    assert!(run.new_train_ann.is_file());
    assert!(run.new_val_ann.is_file());
    assert_eq!(file_names(&run.new_train_images).len(), 8);
    assert_eq!(file_names(&run.new_val_images).len(), 2);

    assert_eq!(outcome.train.images.len(), 12);
    assert_eq!(outcome.val.images.len(), 4);
    assert_eq!(coco::load(&run.train_ann).unwrap(), outcome.train);
    assert_eq!(coco::load(&run.val_ann).unwrap(), outcome.val);

    let val_ids: HashSet<u64> = outcome.val.images.iter().map(|i| i.id).collect();
    assert!(val_ids.contains(&201) && val_ids.contains(&202));
    assert!(outcome.train.images.iter().all(|i| !val_ids.contains(&i.id)));
}

#[test]
fn test_post_update_consolidates_run() {
    let fixture = update_fixture();
    let outcome = update(&fixture.request).unwrap();

    let output_root = fixture.root.join("processed");
    let request = PostUpdateRequest::from_record(&outcome.record, &output_root);
    assert_eq!(request.existing_samples_dir, fixture.root.join("existing"));

    let post = post_update(&request).unwrap();
    assert!(post.relocation.is_complete());

    let train_files = file_names(&post.train_images);
    assert_eq!(train_files.len(), 12);
    assert!(train_files.contains("img_101.jpg"));
    assert_eq!(file_names(&post.val_images).len(), 4);

    assert_eq!(coco::load(&post.train_ann).unwrap(), outcome.train);
    assert_eq!(coco::load(&post.val_ann).unwrap(), outcome.val);
}

#[test]
fn test_post_update_requires_all_directories() {
    let fixture = update_fixture();
    let outcome = update(&fixture.request).unwrap();
    fs::remove_dir_all(fixture.root.join("existing/val_images")).unwrap();

    let output_root = fixture.root.join("processed");
    let request = PostUpdateRequest::from_record(&outcome.record, &output_root);
    let result = post_update(&request);

    assert!(matches!(result, Err(CocoError::MissingDirectory(_))));
    assert!(!output_root.exists());
}
