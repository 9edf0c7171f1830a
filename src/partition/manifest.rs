//! `times.csv` manifests correlating copied images with capture timestamps.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Manifest listing every image in a leaf directory, in copy order.
pub const TIMES_FILE: &str = "times.csv";

#[derive(Debug, Serialize, Deserialize)]
struct TimeRow {
    times: f64,
}

/// Manifest for the images one participant/emotion source contributed to a leaf.
pub fn pair_manifest_name(participant: &str, emotion: &str) -> String {
    format!("times_{participant}_{emotion}.csv")
}

/// Reads the `times` column of a manifest or timestamp table.
pub fn read_times(path: &Path) -> Result<Vec<f64>> {
    if !path.is_file() {
        return Err(PipelineError::SourceNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize::<TimeRow>()
        .map(|row| Ok(row?.times))
        .collect()
}

/// Like [`read_times`], but a missing file is an empty manifest.
pub fn read_times_or_empty(path: &Path) -> Result<Vec<f64>> {
    if path.is_file() {
        read_times(path)
    } else {
        Ok(Vec::new())
    }
}

/// Writes a manifest with a single `times` column, rows in the given order.
pub fn write_times(path: &Path, times: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    if times.is_empty() {
        writer.write_record(["times"])?;
    }
    for &time in times {
        writer.serialize(TimeRow { times: time })?;
    }
    writer.flush().map_err(PipelineError::io(path))?;
    Ok(())
}

/// Image files in a leaf directory, excluding manifests.
pub fn count_images(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir).map_err(PipelineError::io(dir))? {
        let name = entry.map_err(PipelineError::io(dir))?.file_name();
        if name.to_str().is_some_and(is_image_name) {
            count += 1;
        }
    }
    Ok(count)
}

pub fn is_image_name(name: &str) -> bool {
    name.ends_with(".png") || name.ends_with(".jpg")
}
