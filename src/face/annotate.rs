use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::types::Region;

/// Record the external cropping tool persists next to a video's frames.
pub const REGION_RECORD: &str = "region.json";

/// Human-in-the-loop source of crop regions. `None` means the operator
/// cancelled and the caller should fall back to a centered default.
pub trait RegionAnnotator {
    fn annotate(&self, image: &Path) -> Result<Option<Region>>;
}

/// Returns the same answer for every image.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRegion(pub Option<Region>);

impl RegionAnnotator for FixedRegion {
    fn annotate(&self, _image: &Path) -> Result<Option<Region>> {
        Ok(self.0)
    }
}

/// Reads the region persisted by the annotation tool in the image's directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionRecord;

impl RegionRecord {
    pub fn record_path(frame_dir: &Path) -> PathBuf {
        frame_dir.join(REGION_RECORD)
    }

    pub fn store(frame_dir: &Path, region: &Region) -> Result<PathBuf> {
        let path = Self::record_path(frame_dir);
        let json = serde_json::to_string_pretty(region)?;
        fs::write(&path, json).map_err(PipelineError::io(&path))?;
        Ok(path)
    }
}

impl RegionAnnotator for RegionRecord {
    fn annotate(&self, image: &Path) -> Result<Option<Region>> {
        let dir = image.parent().unwrap_or_else(|| Path::new("."));
        let path = Self::record_path(dir);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(PipelineError::io(&path))?;
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

/// Middle file of a directory's sorted listing, used as the representative
/// frame shown to the annotator.
pub fn midpoint_frame(dir: &Path) -> Result<Option<PathBuf>> {
    let mut files = list_images(dir)?;
    if files.is_empty() {
        return Ok(None);
    }
    let mid = files.len() / 2;
    Ok(Some(files.swap_remove(mid)))
}

/// Image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(PipelineError::io(dir))? {
        let path = entry.map_err(PipelineError::io(dir))?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            .unwrap_or(false);
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
