use std::fs;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use affectprep::cli::{
    Cli, Command, CropArgs, CurvesArgs, ExtractArgs, FuseArgs, PartitionArgs, ProcessArgs,
    SensorLogArgs,
};
use affectprep::config::{LabelMode, PipelineConfig};
use affectprep::face::{self, FfmpegFrameSource, RegionRecord};
use affectprep::fusion::{build_fused_dataset, export_jsonl};
use affectprep::partition::manifest::read_times;
use affectprep::partition::{separate_images, PartitionOptions};
use affectprep::pipeline::{process_videos, ProcessOptions};
use affectprep::pupil::{self, sensor_log};
use affectprep::ErrorPolicy;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = PipelineConfig::from_override(cli.config.clone())
        .context("Failed to load pipeline configuration")?;

    match &cli.command {
        Command::Extract(args) => run_extract(args),
        Command::Crop(args) => run_crop(args, &config),
        Command::Partition(args) => run_partition(args, &config),
        Command::Curves(args) => run_curves(args, &config),
        Command::SensorLog(args) => run_sensor_log(args, &config),
        Command::Fuse(args) => run_fuse(args, &config),
        Command::Process(args) => run_process(args, &config),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn policy(skip: bool) -> ErrorPolicy {
    if skip {
        ErrorPolicy::SkipAndLog
    } else {
        ErrorPolicy::Strict
    }
}

fn run_extract(args: &ExtractArgs) -> Result<()> {
    ensure!(args.inclusion_rate > 0, "Inclusion rate must be at least 1");
    let times = read_times(&args.times)
        .with_context(|| format!("Failed to read timestamp table {:?}", args.times))?;
    let source = FfmpegFrameSource::locate()?;
    let frames = face::extract_frames(
        &source,
        &args.video,
        &times,
        &args.output_dir,
        args.inclusion_rate,
        policy(args.skip_out_of_range),
    )
    .with_context(|| format!("Failed to extract frames from {:?}", args.video))?;
    info!(frames = frames.len(), output = %args.output_dir.display(), "extraction complete");
    Ok(())
}

fn run_crop(args: &CropArgs, config: &PipelineConfig) -> Result<()> {
    let mut resolution = config.crop.resolution;
    if let Some(width) = args.width {
        resolution.width = width;
    }
    if let Some(height) = args.height {
        resolution.height = height;
    }
    ensure!(
        resolution.width > 0 && resolution.height > 0,
        "Resolution must be positive, got {}x{}",
        resolution.width,
        resolution.height
    );
    let region = args.region.or(config.crop.region);
    let frames = face::list_images(&args.frame_dir)
        .with_context(|| format!("Failed to list frames in {:?}", args.frame_dir))?;
    let cropped =
        face::crop_and_resize(&frames, region, resolution).context("Failed to crop frames")?;
    info!(cropped = cropped.len(), "crop complete");
    Ok(())
}

fn run_partition(args: &PartitionArgs, config: &PipelineConfig) -> Result<()> {
    args.validate()
        .context("Failed to validate command-line arguments")?;
    let mut split = config.split;
    if let Some(test) = args.test_split {
        split.test_fraction = test;
    }
    if let Some(val) = args.val_split {
        split.val_fraction = val;
    }
    let options = PartitionOptions::new(LabelMode::from_binary_flag(args.binary))
        .with_split(split)
        .with_split_files(!args.no_split)
        .with_split_participants(!args.no_participants)
        .with_malformed_policy(policy(args.skip_malformed));
    let partition = separate_images(&args.sources, &args.output_dir, &config.taxonomy, &options)
        .context("Failed to partition images")?;
    info!(
        splits = partition.splits.len(),
        holdouts = partition.holdouts.len(),
        output = %args.output_dir.display(),
        "partition complete"
    );
    Ok(())
}

fn run_curves(args: &CurvesArgs, config: &PipelineConfig) -> Result<()> {
    let written = pupil::process_data(&args.data_dir, config, policy(args.skip_insufficient))
        .with_context(|| format!("Failed to build curves in {:?}", args.data_dir))?;
    info!(curves = written.len(), "curve building complete");
    Ok(())
}

fn run_sensor_log(args: &SensorLogArgs, config: &PipelineConfig) -> Result<()> {
    let dilations = sensor_log::parse_sensor_file(&args.log, &config.marker_emotions)
        .with_context(|| format!("Failed to parse sensor log {:?}", args.log))?;
    if let Some(parent) = args.output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }
    sensor_log::write_dilations(&args.output, &dilations)?;
    info!(emotions = dilations.len(), output = %args.output.display(), "sensor log converted");
    Ok(())
}

fn run_fuse(args: &FuseArgs, config: &PipelineConfig) -> Result<()> {
    let mut fusion = config.fusion;
    if let Some(window_size) = args.window_size {
        ensure!(window_size > 0, "Window size must be positive");
        fusion.window_size = window_size;
    }
    let (dataset, classes) = build_fused_dataset(&args.curve_dir, &args.partition_dir, &fusion)
        .context("Failed to assemble fused dataset")?;
    info!(samples = dataset.len(), classes = ?classes, "fused dataset ready");
    if let Some(path) = &args.export {
        let written = export_jsonl(&dataset, path)
            .with_context(|| format!("Failed to export fused dataset to {:?}", path))?;
        info!(written, path = %path.display(), "fused dataset exported");
    }
    Ok(())
}

fn run_process(args: &ProcessArgs, config: &PipelineConfig) -> Result<()> {
    let mut options = ProcessOptions::new(LabelMode::from_binary_flag(args.binary));
    options.extract_frames = !args.skip_frames;
    options.crop_images = !args.skip_crop;
    let source = if options.extract_frames {
        FfmpegFrameSource::locate()?
    } else {
        FfmpegFrameSource::default()
    };
    process_videos(
        &args.video_dir,
        &args.output_dir,
        config,
        &source,
        &RegionRecord,
        &options,
    )
    .with_context(|| format!("Failed to process videos in {:?}", args.video_dir))?;
    Ok(())
}
