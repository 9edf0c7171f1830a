//! Temporal fusion of cropped face frames with pupil-dilation windows.
//!
//! For every participant/emotion curve and every timestamp in the matching
//! per-pair manifest of a class directory, the image shown at that time is
//! paired with the curve sampled over the trailing window.

pub mod window;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array1, Array3};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::FusionConfig;
use crate::error::{PipelineError, Result};
use crate::partition::manifest::{pair_manifest_name, read_times};
use crate::pupil::{load_curves, DilationCurve};
use crate::types::SampleName;

pub use window::window_times;

/// One aligned training example.
#[derive(Debug, Clone)]
pub struct FusedSample {
    pub image: RgbImage,
    pub window: Array1<f64>,
    pub label: usize,
    pub image_path: PathBuf,
    pub end_time: f64,
}

impl FusedSample {
    /// Image as a height × width × channel float array.
    pub fn image_array(&self) -> Array3<f32> {
        let (width, height) = self.image.dimensions();
        Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
            self.image.get_pixel(x as u32, y as u32)[c] as f32
        })
    }
}

/// Index entry resolved while building the dataset; images are only read
/// when the dataset is iterated.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionEntry {
    pub image_path: PathBuf,
    pub participant: String,
    pub emotion: String,
    pub end_time: f64,
    pub label: usize,
}

/// Finite, restartable collection of fused samples.
#[derive(Debug, Clone)]
pub struct FusedDataset {
    classes: Vec<String>,
    entries: Vec<FusionEntry>,
    curves: BTreeMap<(String, String), DilationCurve>,
    config: FusionConfig,
}

impl FusedDataset {
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn entries(&self) -> &[FusionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Curve times (manifest seconds) the window for `entry` is sampled at.
    pub fn window_times(&self, entry: &FusionEntry) -> Vec<f64> {
        window_times(entry.end_time, self.config.window_size, self.config.period)
    }

    pub fn window(&self, entry: &FusionEntry) -> Result<Array1<f64>> {
        let key = (entry.participant.clone(), entry.emotion.clone());
        let curve = self.curves.get(&key).ok_or_else(|| PipelineError::InvalidSamples {
            key: format!("{}_{}", entry.participant, entry.emotion),
            reason: "no curve loaded".to_string(),
        })?;
        let scale = self.config.curve_time_scale;
        Ok(self
            .window_times(entry)
            .into_iter()
            .map(|time| curve.evaluate(time * scale))
            .collect())
    }

    pub fn load(&self, entry: &FusionEntry) -> Result<FusedSample> {
        let size = self.config.image_size;
        let image = image::open(&entry.image_path)?
            .resize_exact(size.width, size.height, FilterType::Triangle)
            .to_rgb8();
        Ok(FusedSample {
            image,
            window: self.window(entry)?,
            label: entry.label,
            image_path: entry.image_path.clone(),
            end_time: entry.end_time,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<FusedSample>> + '_ {
        self.entries.iter().map(move |entry| self.load(entry))
    }
}

/// Indexes every curve in `curve_dir` against the per-pair manifests in each
/// class directory of `partitioned_image_dir`. Classes are the sorted class
/// directory names and labels are their indices. Timestamps without a full
/// window of history are skipped.
pub fn build_fused_dataset(
    curve_dir: &Path,
    partitioned_image_dir: &Path,
    config: &FusionConfig,
) -> Result<(FusedDataset, Vec<String>)> {
    let curves = load_curves(curve_dir)?;
    let classes = class_names(partitioned_image_dir)?;
    let min_end_time = config.min_end_time();

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for (label, class) in classes.iter().enumerate() {
        let class_dir = partitioned_image_dir.join(class);
        for (participant, emotion) in curves.keys() {
            let manifest = class_dir.join(pair_manifest_name(participant, emotion));
            if !manifest.is_file() {
                continue;
            }
            for end_time in read_times(&manifest)? {
                if end_time < min_end_time {
                    skipped += 1;
                    continue;
                }
                entries.push(FusionEntry {
                    image_path: locate_image(&class_dir, participant, emotion, end_time)?,
                    participant: participant.clone(),
                    emotion: emotion.clone(),
                    end_time,
                    label,
                });
            }
        }
    }
    debug!(skipped, "timestamps without a full window skipped");
    info!(
        samples = entries.len(),
        classes = classes.len(),
        curves = curves.len(),
        "fused dataset indexed"
    );

    let dataset = FusedDataset {
        classes: classes.clone(),
        entries,
        curves,
        config: *config,
    };
    Ok((dataset, classes))
}

/// Subdirectory names of `dir`, sorted.
pub fn class_names(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(PipelineError::SourceNotFound(dir.to_path_buf()));
    }
    let mut classes = Vec::new();
    for entry in fs::read_dir(dir).map_err(PipelineError::io(dir))? {
        let entry = entry.map_err(PipelineError::io(dir))?;
        if entry.path().is_dir() {
            if let Ok(name) = entry.file_name().into_string() {
                classes.push(name);
            }
        }
    }
    classes.sort();
    Ok(classes)
}

fn locate_image(class_dir: &Path, participant: &str, emotion: &str, end_time: f64) -> Result<PathBuf> {
    let name = SampleName::new(participant, emotion, end_time);
    let png = class_dir.join(name.file_name());
    if png.is_file() {
        return Ok(png);
    }
    let jpg = class_dir.join(name.with_extension("jpg").file_name());
    if jpg.is_file() {
        return Ok(jpg);
    }
    Err(PipelineError::SourceNotFound(png))
}

#[derive(Serialize)]
struct ExportRecord<'a> {
    image: &'a Path,
    class: &'a str,
    label: usize,
    end_time: f64,
    window: Vec<f64>,
}

/// Writes one JSON line per sample (image path, class, label, end time and
/// dilation window) for external trainers. Images are not decoded.
pub fn export_jsonl(dataset: &FusedDataset, path: &Path) -> Result<usize> {
    let file = File::create(path).map_err(PipelineError::io(path))?;
    let mut writer = BufWriter::new(file);
    for entry in dataset.entries() {
        let record = ExportRecord {
            image: &entry.image_path,
            class: &dataset.classes[entry.label],
            label: entry.label,
            end_time: entry.end_time,
            window: dataset.window(entry)?.to_vec(),
        };
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n").map_err(PipelineError::io(path))?;
    }
    writer.flush().map_err(PipelineError::io(path))?;
    Ok(dataset.len())
}
