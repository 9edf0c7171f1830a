use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{ErrorPolicy, PipelineError, Result};

use super::segments::{read_raw_log, read_segments, segment_samples};
use super::spline::{CubicSpline, SplineError};

static CURVE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^pupil_(?P<participant>\w+)_(?P<emotion>[A-Za-z]+)\.json$")
        .unwrap_or_else(|err| panic!("invalid curve file pattern: {err}"))
});

static DATA_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data_(?P<participant>\w+)\.csv$")
        .unwrap_or_else(|err| panic!("invalid data file pattern: {err}"))
});

static SEGMENTS_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^segments_(?P<participant>\w+)\.csv$")
        .unwrap_or_else(|err| panic!("invalid segments file pattern: {err}"))
});

/// Smooth pupil-diameter interpolant for one participant/emotion segment.
/// Time zero is the segment start; units are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilationCurve {
    pub participant: String,
    pub emotion: String,
    spline: CubicSpline,
}

impl DilationCurve {
    pub fn fit(
        participant: impl Into<String>,
        emotion: impl Into<String>,
        times: &[f64],
        diameters: &[f64],
    ) -> Result<Self> {
        let participant = participant.into();
        let emotion = emotion.into();
        let key = curve_key(&participant, &emotion);
        let spline = CubicSpline::fit(times, diameters).map_err(|err| match err {
            SplineError::TooFewPoints(count) => PipelineError::InsufficientSamples { key, count },
            other => PipelineError::InvalidSamples {
                key,
                reason: other.to_string(),
            },
        })?;
        Ok(Self {
            participant,
            emotion,
            spline,
        })
    }

    pub fn key(&self) -> String {
        curve_key(&self.participant, &self.emotion)
    }

    pub fn domain(&self) -> (f64, f64) {
        self.spline.domain()
    }

    pub fn evaluate(&self, time: f64) -> f64 {
        self.spline.evaluate(time)
    }

    pub fn file_name(&self) -> String {
        curve_file_name(&self.participant, &self.emotion)
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        let json = serde_json::to_vec(self)?;
        fs::write(&path, json).map_err(PipelineError::io(&path))?;
        Ok(path)
    }

    /// Reads a saved curve. Well-formed JSON whose coefficients cannot be
    /// evaluated is reported as [`PipelineError::InvalidSamples`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).map_err(PipelineError::io(path))?;
        serde_json::from_slice(&raw).map_err(|err| {
            if err.is_data() {
                PipelineError::InvalidSamples {
                    key: path.display().to_string(),
                    reason: err.to_string(),
                }
            } else {
                err.into()
            }
        })
    }
}

pub fn curve_key(participant: &str, emotion: &str) -> String {
    format!("{participant}_{emotion}")
}

pub fn curve_file_name(participant: &str, emotion: &str) -> String {
    format!("pupil_{}.json", curve_key(participant, emotion))
}

/// Participant and emotion encoded in a curve file name.
pub fn parse_curve_file_name(name: &str) -> Option<(String, String)> {
    let caps = CURVE_FILE.captures(name)?;
    Some((caps["participant"].to_string(), caps["emotion"].to_string()))
}

/// Loads every `pupil_<participant>_<emotion>.json` in `dir`, keyed by
/// `(participant, emotion)`.
pub fn load_curves(dir: &Path) -> Result<BTreeMap<(String, String), DilationCurve>> {
    if !dir.is_dir() {
        return Err(PipelineError::SourceNotFound(dir.to_path_buf()));
    }
    let mut curves = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(PipelineError::io(dir))? {
        let path = entry.map_err(PipelineError::io(dir))?.path();
        let Some(key) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_curve_file_name)
        else {
            continue;
        };
        curves.insert(key, DilationCurve::load(&path)?);
    }
    debug!(dir = %dir.display(), count = curves.len(), "loaded curves");
    Ok(curves)
}

/// Segments one participant's raw log, fits a curve per retained segment
/// and writes each to `data_dir`. Returns the written paths.
///
/// Excluded segments are dropped before fitting; a segment name with no
/// emotion mapping is an error.
pub fn process_participant(
    data_dir: &Path,
    raw_data_file: &Path,
    segments_file: &Path,
    participant: &str,
    config: &PipelineConfig,
    on_insufficient: ErrorPolicy,
) -> Result<Vec<PathBuf>> {
    let segments = read_segments(segments_file)?;
    let rows = read_raw_log(raw_data_file)?;
    let segmentation = segment_samples(&segments, &rows);
    if segmentation.gap_rows > 0 || segmentation.trailing_rows > 0 {
        warn!(
            participant,
            gap_rows = segmentation.gap_rows,
            trailing_rows = segmentation.trailing_rows,
            "rows outside every segment were dropped"
        );
    }

    let mut written = Vec::new();
    for samples in segmentation.segments {
        let name = &samples.segment.name;
        if config.is_excluded_segment(name) {
            debug!(segment = %name, "excluded segment");
            continue;
        }
        let emotion = config.segment_emotion(name)?;
        let curve = match DilationCurve::fit(participant, emotion, &samples.times, &samples.diameters) {
            Ok(curve) => curve,
            Err(err @ PipelineError::InsufficientSamples { .. }) => {
                on_insufficient.handle(err)?;
                continue;
            }
            Err(err) => return Err(err),
        };
        let path = curve.save(data_dir)?;
        debug!(segment = %name, samples = samples.times.len(), path = %path.display(), "curve written");
        written.push(path);
    }
    info!(participant, curves = written.len(), "participant processed");
    Ok(written)
}

/// `data_<id>.csv` / `segments_<id>.csv` pairs found in a directory.
pub fn discover_participants(data_dir: &Path) -> Result<BTreeMap<String, (PathBuf, PathBuf)>> {
    if !data_dir.is_dir() {
        return Err(PipelineError::SourceNotFound(data_dir.to_path_buf()));
    }
    let mut data_files = BTreeMap::new();
    let mut segment_files = BTreeMap::new();
    for entry in fs::read_dir(data_dir).map_err(PipelineError::io(data_dir))? {
        let path = entry.map_err(PipelineError::io(data_dir))?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if let Some(caps) = DATA_FILE.captures(name) {
            data_files.insert(caps["participant"].to_string(), path.clone());
        } else if let Some(caps) = SEGMENTS_FILE.captures(name) {
            segment_files.insert(caps["participant"].to_string(), path.clone());
        }
    }

    let mut pairs = BTreeMap::new();
    for (participant, data_file) in data_files {
        let segments_file = segment_files
            .remove(&participant)
            .ok_or_else(|| {
                PipelineError::SourceNotFound(data_dir.join(format!("segments_{participant}.csv")))
            })?;
        pairs.insert(participant, (data_file, segments_file));
    }
    for participant in segment_files.keys() {
        warn!(participant = %participant, "segments table without a data log; ignored");
    }
    Ok(pairs)
}

/// Runs [`process_participant`] for every participant found in `data_dir`.
pub fn process_data(
    data_dir: &Path,
    config: &PipelineConfig,
    on_insufficient: ErrorPolicy,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (participant, (data_file, segments_file)) in discover_participants(data_dir)? {
        written.extend(process_participant(
            data_dir,
            &data_file,
            &segments_file,
            &participant,
            config,
            on_insufficient,
        )?);
    }
    Ok(written)
}
