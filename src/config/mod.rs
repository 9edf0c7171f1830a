use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::types::{Region, Resolution};

/// Whether emotion directories are grouped by their own name or by the
/// binary positive/negative projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMode {
    Multiclass,
    Binary,
}

impl LabelMode {
    pub fn from_binary_flag(binary: bool) -> Self {
        if binary {
            Self::Binary
        } else {
            Self::Multiclass
        }
    }
}

/// Fixed emotion vocabulary together with its binary projection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct EmotionTaxonomy {
    binary: BTreeMap<String, String>,
}

impl EmotionTaxonomy {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            binary: entries
                .into_iter()
                .map(|(emotion, category)| (emotion.into(), category.into()))
                .collect(),
        }
    }

    /// Multiclass vocabulary, sorted.
    pub fn emotions(&self) -> impl Iterator<Item = &str> {
        self.binary.keys().map(String::as_str)
    }

    pub fn contains(&self, emotion: &str) -> bool {
        self.binary.contains_key(emotion)
    }

    /// Projects an emotion to its binary category.
    pub fn binary_category(&self, emotion: &str) -> Option<&str> {
        self.binary.get(emotion).map(String::as_str)
    }

    /// Category an emotion belongs to under `mode`; `None` when the emotion is
    /// outside the vocabulary.
    pub fn category(&self, emotion: &str, mode: LabelMode) -> Option<&str> {
        match mode {
            LabelMode::Multiclass => self.binary.get_key_value(emotion).map(|(k, _)| k.as_str()),
            LabelMode::Binary => self.binary_category(emotion),
        }
    }

    /// Distinct categories under `mode`, sorted.
    pub fn categories(&self, mode: LabelMode) -> Vec<&str> {
        let set: BTreeSet<&str> = match mode {
            LabelMode::Multiclass => self.emotions().collect(),
            LabelMode::Binary => self.binary.values().map(String::as_str).collect(),
        };
        set.into_iter().collect()
    }
}

impl Default for EmotionTaxonomy {
    fn default() -> Self {
        Self::new([
            ("anger", "negative"),
            ("calm", "positive"),
            ("fear", "negative"),
            ("fun", "positive"),
            ("happy", "positive"),
            ("joy", "positive"),
            ("sad", "negative"),
        ])
    }
}

/// Train/val/test fractions; `val_fraction` applies to what remains after the
/// test split.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub val_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            val_fraction: 0.2,
            seed: 496,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub resolution: Resolution,
    /// Region applied to every frame when no annotator record exists.
    pub region: Option<Region>,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            region: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Number of curve evaluations per dilation window.
    pub window_size: usize,
    /// Sampling period of the pupil signal, in manifest seconds.
    pub period: f64,
    /// Curve time units per manifest second (curves are fitted in ms).
    pub curve_time_scale: f64,
    pub image_size: Resolution,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            period: 0.01,
            curve_time_scale: 1000.0,
            image_size: Resolution::default(),
        }
    }
}

impl FusionConfig {
    /// Earliest manifest time that has a full window of history.
    pub fn min_end_time(&self) -> f64 {
        self.window_size as f64 * self.period
    }
}

/// Every tunable table and constant the pipeline consumes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub taxonomy: EmotionTaxonomy,
    /// Segment name (stimulus video) to elicited emotion.
    pub segment_emotions: BTreeMap<String, String>,
    /// Segments whose name contains any of these are never fitted.
    pub exclusion_keywords: Vec<String>,
    /// Sensor-stream marker id to elicited emotion.
    pub marker_emotions: BTreeMap<u32, String>,
    /// Frames per second sampled when a video has no timestamp table.
    pub frame_rate: f64,
    pub split: SplitConfig,
    pub crop: CropConfig,
    pub fusion: FusionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let segment_emotions = [
            ("1.mp4", "joy"),
            ("2.mp4", "anger"),
            ("3.mp4", "fear"),
            ("4.mp4", "fun"),
            ("5.mp4", "sad"),
            ("6.mp4", "happy"),
            ("7.mp4", "calm"),
        ]
        .into_iter()
        .map(|(name, emotion)| (name.to_string(), emotion.to_string()))
        .collect();

        let marker_emotions = [
            (2..=4, "joy"),
            (5..=7, "anger"),
            (8..=12, "fear"),
            (13..=16, "fun"),
            (17..=21, "sad"),
            (22..=25, "happy"),
        ]
        .into_iter()
        .flat_map(|(ids, emotion)| ids.map(move |id| (id, emotion.to_string())))
        .collect();

        Self {
            taxonomy: EmotionTaxonomy::default(),
            segment_emotions,
            exclusion_keywords: vec!["transition".to_string()],
            marker_emotions,
            frame_rate: 1.0,
            split: SplitConfig::default(),
            crop: CropConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration from `path` when given, defaults otherwise.
    pub fn from_override(path: Option<PathBuf>) -> Result<Self> {
        let config = match path {
            Some(custom) => Self::from_file(&custom)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path).map_err(PipelineError::io(path))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
        if self.taxonomy.emotions().next().is_none() {
            return invalid("taxonomy must list at least one emotion".into());
        }
        for (fraction, label) in [
            (self.split.test_fraction, "test_fraction"),
            (self.split.val_fraction, "val_fraction"),
        ] {
            if !(0.0..1.0).contains(&fraction) {
                return invalid(format!("{label} must lie in [0, 1), got {fraction}"));
            }
        }
        if self.fusion.window_size == 0 {
            return invalid("fusion window_size must be positive".into());
        }
        if !(self.fusion.period > 0.0) || !(self.fusion.curve_time_scale > 0.0) {
            return invalid("fusion period and curve_time_scale must be positive".into());
        }
        if !(self.frame_rate > 0.0) {
            return invalid(format!("frame_rate must be positive, got {}", self.frame_rate));
        }
        let mapped = self
            .segment_emotions
            .values()
            .chain(self.marker_emotions.values());
        for emotion in mapped {
            if !self.taxonomy.contains(emotion) {
                return invalid(format!("emotion {emotion:?} is not in the taxonomy"));
            }
        }
        Ok(())
    }

    /// Emotion elicited by a segment; surrounding whitespace in the name is ignored.
    pub fn segment_emotion(&self, segment_name: &str) -> Result<&str> {
        self.segment_emotions
            .get(segment_name.trim())
            .map(String::as_str)
            .ok_or_else(|| PipelineError::UnknownSegment(segment_name.to_string()))
    }

    pub fn is_excluded_segment(&self, segment_name: &str) -> bool {
        self.exclusion_keywords
            .iter()
            .any(|word| segment_name.contains(word.as_str()))
    }
}
