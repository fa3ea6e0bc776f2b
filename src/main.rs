use clap::Parser;
use log::{error, info, warn};
use std::process::ExitCode;

use cvops::categories::{delete_file, remap_file};
use cvops::config::{
    CategoryConfig, MergeArgs, PostUpdateArgs, SplitArgs, UpdateArgs, ValidateArgs,
};
use cvops::format::replace_format_file;
use cvops::merge::merge_directory;
use cvops::separate::separate_file;
use cvops::{
    coco, post_update, split_dataset, update, validate_images, Cli, CocoError, CocoResult,
    Commands, ImageAssignment, ImageRelocation, PostUpdateRequest, SplitConfig, SplitRequest,
    UpdateRecord, UpdateRequest,
};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Split(args) => run_split(args),
        Commands::Update(args) => run_update(args),
        Commands::Postupdate(args) => run_post_update(args),
        Commands::Validate(args) => run_validate(args),
        Commands::Merge(args) => run_merge(args),
        Commands::Delete(args) => CategoryConfig::from_path(&args.config)
            .and_then(|config| delete_file(&config, &args.ann_path))
            .map(|path| match path {
                Some(path) => info!("Saved {}", path.display()),
                None => info!("Nothing to be removed."),
            }),
        Commands::Remap(args) => CategoryConfig::from_path(&args.config)
            .and_then(|config| remap_file(&config, &args.ann_path))
            .map(|path| info!("Saved {}", path.display())),
        Commands::SeparateByName(args) => {
            separate_file(&args.img_path, &args.ann_path, &args.name_keys).map(|written| {
                for path in written {
                    info!("Saved {}", path.display());
                }
            })
        }
        Commands::ReplaceImgFormat(args) => {
            replace_format_file(&args.annotation, &args.format).map(|_| ())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_split(args: SplitArgs) -> CocoResult<()> {
    let assignment = if args.shared_images {
        ImageAssignment::Shared
    } else {
        ImageAssignment::Majority
    };
    let config = SplitConfig::new(args.ratio)?
        .stratified(args.stratified)
        .with_seed(args.seed)
        .with_image_assignment(assignment);

    let images = args.image_locate.as_deref().map(|dir| {
        if args.independent {
            ImageRelocation::independent_layout(dir, &args.train_path, &args.test_path)
        } else {
            ImageRelocation::pipeline_layout(dir, &args.train_path, &args.test_path)
        }
    });

    let report = split_dataset(&SplitRequest {
        ann_path: args.ann_path,
        train_path: args.train_path,
        test_path: args.test_path,
        config,
        images,
    })?;

    if !report.dropped_categories.is_empty() {
        warn!(
            "Dropped categories with too few annotations: {:?}",
            report.dropped_categories
        );
    }
    let failures = report.relocation_failures();
    if failures > 0 {
        warn!("{} image(s) could not be copied", failures);
    }
    Ok(())
}

fn run_update(args: UpdateArgs) -> CocoResult<()> {
    let config = SplitConfig::new(args.split_ratio)?.with_seed(args.seed);
    let outcome = update(&UpdateRequest {
        new_ann_path: args.new_ann_path,
        train_ann_path: args.train_ann_path,
        val_ann_path: args.val_ann_path,
        config,
        new_image_dir: args.new_image_locate,
        results_root: args.results_root,
    })?;

    info!(
        "Combined train: {} images, {} annotations; combined val: {} images, {} annotations",
        outcome.train.images.len(),
        outcome.train.annotations.len(),
        outcome.val.images.len(),
        outcome.val.annotations.len()
    );
    if let Some(path) = args.record {
        outcome.record.save(&path)?;
    }
    Ok(())
}

fn run_post_update(args: PostUpdateArgs) -> CocoResult<()> {
    // clap requires both directories when no record is given
    let request = match args.record {
        Some(record) => {
            PostUpdateRequest::from_record(&UpdateRecord::load(&record)?, &args.output_root)
        }
        None => PostUpdateRequest {
            existing_samples_dir: args.existing_samples_dir.unwrap_or_default(),
            results_path: args.results_path.unwrap_or_default(),
            output_root: args.output_root,
        },
    };

    let outcome = post_update(&request)?;
    info!(
        "Train: {} and {}",
        outcome.train_ann.display(),
        outcome.train_images.display()
    );
    info!(
        "Val: {} and {}",
        outcome.val_ann.display(),
        outcome.val_images.display()
    );
    Ok(())
}

fn run_validate(args: ValidateArgs) -> CocoResult<()> {
    let store = coco::load(&args.ann_path)?;
    let validation = validate_images(&store, &args.img_path);

    for name in &validation.unreferenced {
        warn!("Image {} is not referenced by {}", name, args.ann_path.display());
    }
    if !validation.missing.is_empty() {
        return Err(CocoError::Validation {
            ann_path: args.ann_path,
            image_dir: args.img_path,
            missing: validation.missing,
        });
    }
    info!(
        "All {} images of {} exist in {}",
        store.images.len(),
        args.ann_path.display(),
        args.img_path.display()
    );
    Ok(())
}

fn run_merge(args: MergeArgs) -> CocoResult<()> {
    merge_directory(&args.ann_dir, &args.output, args.renumber)?;
    info!("Saved {}", args.output.display());
    Ok(())
}
