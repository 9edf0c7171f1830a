use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::types::{Point, Region};

#[derive(Parser, Debug)]
#[command(
    name = "affectprep",
    version,
    about = "Face-frame and pupillometry dataset preparation for emotion recognition"
)]
pub struct Cli {
    /// JSON configuration overriding the built-in tables and constants.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save the frames of a video at the timestamps of a table.
    Extract(ExtractArgs),
    /// Crop and resize every frame of a directory into its `cropped` folder.
    Crop(CropArgs),
    /// Split cropped samples into emotion-keyed train/val/test directories.
    Partition(PartitionArgs),
    /// Fit a dilation curve per participant and stimulus segment.
    Curves(CurvesArgs),
    /// Bucket a raw eye-tracker stream into per-emotion diameters.
    SensorLog(SensorLogArgs),
    /// Pair partitioned images with dilation windows.
    Fuse(FuseArgs),
    /// Extract, crop and partition every video of a directory.
    Process(ProcessArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    pub video: PathBuf,
    pub output_dir: PathBuf,
    /// CSV with a `times` column of ascending timestamps in milliseconds.
    #[arg(long, value_name = "CSV")]
    pub times: PathBuf,
    /// Keep every Nth timestamp.
    #[arg(long = "inclusion-rate", default_value_t = 1)]
    pub inclusion_rate: usize,
    /// Skip timestamps past the end of the video instead of failing.
    #[arg(long = "skip-out-of-range")]
    pub skip_out_of_range: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CropArgs {
    pub frame_dir: PathBuf,
    /// Crop box as X1,Y1,X2,Y2; defaults to a box centered on each frame.
    #[arg(long, value_parser = parse_region)]
    pub region: Option<Region>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct PartitionArgs {
    pub output_dir: PathBuf,
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
    /// Group emotions into positive/negative.
    #[arg(long)]
    pub binary: bool,
    /// Copy everything into one level instead of train/val/test.
    #[arg(long = "no-split")]
    pub no_split: bool,
    /// Do not hold out each participant's test samples.
    #[arg(long = "no-participants")]
    pub no_participants: bool,
    #[arg(long = "test-split")]
    pub test_split: Option<f64>,
    #[arg(long = "val-split")]
    pub val_split: Option<f64>,
    /// Skip samples whose names carry no timestamp instead of failing.
    #[arg(long = "skip-malformed")]
    pub skip_malformed: bool,
}

impl PartitionArgs {
    pub fn validate(&self) -> Result<()> {
        for (fraction, label) in [(self.test_split, "test-split"), (self.val_split, "val-split")] {
            if let Some(value) = fraction {
                ensure!(
                    (0.0..1.0).contains(&value),
                    "{label} must lie in [0, 1), got {value}"
                );
            }
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct CurvesArgs {
    /// Directory holding `data_<id>.csv` and `segments_<id>.csv` pairs.
    pub data_dir: PathBuf,
    /// Skip segments with fewer than two samples instead of failing.
    #[arg(long = "skip-insufficient")]
    pub skip_insufficient: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SensorLogArgs {
    pub log: PathBuf,
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct FuseArgs {
    pub curve_dir: PathBuf,
    pub partition_dir: PathBuf,
    #[arg(long = "window-size")]
    pub window_size: Option<usize>,
    /// Write one JSON line per fused sample.
    #[arg(long, value_name = "JSONL")]
    pub export: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    pub video_dir: PathBuf,
    pub output_dir: PathBuf,
    #[arg(long)]
    pub binary: bool,
    /// Reuse frames already extracted next to each video.
    #[arg(long = "skip-frames")]
    pub skip_frames: bool,
    /// Reuse existing `cropped` directories.
    #[arg(long = "skip-crop")]
    pub skip_crop: bool,
}

/// Parses `X1,Y1,X2,Y2` into a validated region.
pub fn parse_region(raw: &str) -> Result<Region> {
    let coords = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .with_context(|| format!("invalid coordinate '{part}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    ensure!(coords.len() == 4, "region must be X1,Y1,X2,Y2");
    Ok(Region::new(
        Point::new(coords[0], coords[1]),
        Point::new(coords[2], coords[3]),
    )?)
}
