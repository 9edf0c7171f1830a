//! End-to-end face flow: extract frames from every video, crop them with the
//! region the annotator picks for each video, then partition the results.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::config::{LabelMode, PipelineConfig};
use crate::error::{ErrorPolicy, PipelineError, Result};
use crate::face::extract::{is_video_file, synthesize_timestamps};
use crate::face::{crop_and_resize, extract_frames, list_images, midpoint_frame};
use crate::face::{FrameSource, RegionAnnotator};
use crate::partition::manifest::read_times;
use crate::partition::{separate_images, Partition, PartitionOptions};

/// Which stages [`process_videos`] runs and how strictly.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    pub mode: LabelMode,
    /// Re-extract frames; otherwise frames already on disk are reused.
    pub extract_frames: bool,
    /// Re-crop frames; otherwise existing `cropped` directories are reused.
    pub crop_images: bool,
    pub inclusion_rate: usize,
    pub out_of_range: ErrorPolicy,
}

impl ProcessOptions {
    pub fn new(mode: LabelMode) -> Self {
        Self {
            mode,
            extract_frames: true,
            crop_images: true,
            inclusion_rate: 1,
            out_of_range: ErrorPolicy::Strict,
        }
    }
}

/// Path of the optional timestamp table (`times` column, ms) for a video.
pub fn timestamp_table(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    video.with_file_name(format!("{stem}_times.csv"))
}

/// Video files directly inside `dir`, sorted by name.
pub fn list_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::SourceNotFound(dir.to_path_buf()));
    }
    let mut videos = Vec::new();
    for entry in fs::read_dir(dir).map_err(PipelineError::io(dir))? {
        let path = entry.map_err(PipelineError::io(dir))?.path();
        if path.is_file() && is_video_file(&path) {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

/// Target timestamps for a video: its table when present, otherwise one
/// every `1 / frame_rate` seconds across the probed duration.
pub fn video_timestamps(
    source: &dyn FrameSource,
    video: &Path,
    frame_rate: f64,
) -> Result<Vec<f64>> {
    let table = timestamp_table(video);
    if table.is_file() {
        return read_times(&table);
    }
    let duration = source.duration(video)?;
    debug!(video = %video.display(), duration, "no timestamp table; sampling at frame rate");
    Ok(synthesize_timestamps(duration, frame_rate))
}

/// Runs extraction, cropping and partitioning for every video in
/// `video_dir`. Frames of `<dir>/<stem>.mp4` live in `<dir>/<stem>/`.
pub fn process_videos(
    video_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    source: &dyn FrameSource,
    annotator: &dyn RegionAnnotator,
    options: &ProcessOptions,
) -> Result<Partition> {
    let videos = list_videos(video_dir)?;
    if videos.is_empty() {
        warn!(dir = %video_dir.display(), "no videos found");
    }

    let mut image_dirs = Vec::with_capacity(videos.len());
    for video in &videos {
        let image_dir = video.with_extension("");
        if options.extract_frames {
            let times = video_timestamps(source, video, config.frame_rate)?;
            extract_frames(
                source,
                video,
                &times,
                &image_dir,
                options.inclusion_rate,
                options.out_of_range,
            )?;
        }
        image_dirs.push(image_dir);
    }

    if options.crop_images {
        for image_dir in &image_dirs {
            crop_directory(image_dir, config, annotator)?;
        }
    }

    let partition_options = PartitionOptions::new(options.mode).with_split(config.split);
    let partition = separate_images(&image_dirs, output_dir, &config.taxonomy, &partition_options)?;
    info!(
        videos = videos.len(),
        output = %output_dir.display(),
        "processing complete"
    );
    Ok(partition)
}

/// Crops every frame in `image_dir` with the region chosen on its midpoint
/// frame. An annotator failure is logged and treated as no answer.
pub fn crop_directory(
    image_dir: &Path,
    config: &PipelineConfig,
    annotator: &dyn RegionAnnotator,
) -> Result<Vec<PathBuf>> {
    let Some(midpoint) = midpoint_frame(image_dir)? else {
        error!(dir = %image_dir.display(), "directory is empty; nothing to crop");
        return Ok(Vec::new());
    };
    let region = match annotator.annotate(&midpoint) {
        Ok(region) => region,
        Err(err) => {
            error!(frame = %midpoint.display(), error = %err, "annotation failed");
            None
        }
    }
    .or(config.crop.region);
    debug!(dir = %image_dir.display(), ?region, "cropping frames");

    let frames = list_images(image_dir)?;
    crop_and_resize(&frames, region, config.crop.resolution)
}
