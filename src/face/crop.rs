use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{Region, Resolution, CROPPED_SUFFIX};

/// Name of the subdirectory cropped frames are written to.
pub const CROPPED_DIR: &str = "cropped";

/// Crops and resizes each frame into `<frame dir>/cropped/<stem>_c.<ext>`,
/// returning the output paths in input order.
///
/// Without a region, each image gets a box of `resolution` centered on its
/// own dimensions.
pub fn crop_and_resize(
    frame_paths: &[PathBuf],
    region: Option<Region>,
    resolution: Resolution,
) -> Result<Vec<PathBuf>> {
    frame_paths
        .par_iter()
        .map(|path| crop_and_resize_image(path, region, resolution))
        .collect()
}

pub fn crop_and_resize_image(
    image_path: &Path,
    region: Option<Region>,
    resolution: Resolution,
) -> Result<PathBuf> {
    let image = image::open(image_path)?;
    let (width, height) = (image.width(), image.height());
    let region = match region {
        Some(region) => region.clamp_to(width, height)?,
        None => Region::centered(width, height, resolution)?,
    };

    let origin = region.top_left();
    let resized = image
        .crop_imm(origin.x, origin.y, region.width(), region.height())
        .resize_exact(resolution.width, resolution.height, FilterType::Triangle);

    let output = cropped_path(image_path)?;
    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir).map_err(PipelineError::io(dir))?;
    }
    resized.save(&output)?;
    debug!(source = %image_path.display(), output = %output.display(), "cropped frame");
    Ok(output)
}

/// Where the cropped counterpart of `image_path` is written.
pub fn cropped_path(image_path: &Path) -> Result<PathBuf> {
    let stem = image_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| PipelineError::filename(image_path.display().to_string(), "no file stem"))?;
    let extension = image_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png");
    let parent = image_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(parent
        .join(CROPPED_DIR)
        .join(format!("{stem}{CROPPED_SUFFIX}.{extension}")))
}
