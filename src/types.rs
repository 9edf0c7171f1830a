//! Core types for the affectprep data-preparation pipeline

use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Suffix inserted before the extension of every cropped image.
pub const CROPPED_SUFFIX: &str = "_c";

static SAMPLE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<participant>.+)_(?P<emotion>[^_]+)_(?P<time>\d+\.\d+)_c\.(?P<ext>png|jpg)$")
        .unwrap_or_else(|err| panic!("invalid sample name pattern: {err}"))
});

static SAMPLE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.+_(?P<time>\d+\.\d+)_c\.(png|jpg)$")
        .unwrap_or_else(|err| panic!("invalid sample time pattern: {err}"))
});

/// Pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Target output size of a cropped image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(224, 224)
    }
}

/// Rectangular crop region; `top_left` is strictly above and left of `bottom_right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    top_left: Point,
    bottom_right: Point,
}

impl Region {
    pub fn new(top_left: Point, bottom_right: Point) -> Result<Self> {
        if top_left.x >= bottom_right.x || top_left.y >= bottom_right.y {
            return Err(PipelineError::InvalidRegion(format!(
                "top-left ({}, {}) must lie above and left of bottom-right ({}, {})",
                top_left.x, top_left.y, bottom_right.x, bottom_right.y
            )));
        }
        Ok(Self {
            top_left,
            bottom_right,
        })
    }

    /// Box of size `resolution` centered in an image of the given dimensions,
    /// shrunk to the image when the image is smaller than the resolution.
    pub fn centered(image_width: u32, image_height: u32, resolution: Resolution) -> Result<Self> {
        let width = resolution.width.min(image_width);
        let height = resolution.height.min(image_height);
        let x = (image_width - width) / 2;
        let y = (image_height - height) / 2;
        Self::new(Point::new(x, y), Point::new(x + width, y + height))
    }

    pub fn top_left(&self) -> Point {
        self.top_left
    }

    pub fn bottom_right(&self) -> Point {
        self.bottom_right
    }

    pub fn width(&self) -> u32 {
        self.bottom_right.x - self.top_left.x
    }

    pub fn height(&self) -> u32 {
        self.bottom_right.y - self.top_left.y
    }

    /// Intersects the region with an image's bounds.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Result<Self> {
        let bottom_right = Point::new(
            self.bottom_right.x.min(image_width),
            self.bottom_right.y.min(image_height),
        );
        Self::new(self.top_left, bottom_right)
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawRegion {
            top_left: Point,
            bottom_right: Point,
        }

        let raw = RawRegion::deserialize(deserializer)?;
        Region::new(raw.top_left, raw.bottom_right).map_err(serde::de::Error::custom)
    }
}

/// A frame written by the extractor
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub source: PathBuf,
    /// Seconds since the first requested timestamp of the extraction batch
    pub offset: f64,
    pub path: PathBuf,
}

/// Structured form of a cropped sample's filename:
/// `{participant}_{emotion}_{timestamp}_c.{ext}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleName {
    pub participant: String,
    pub emotion: String,
    pub timestamp: f64,
    pub extension: String,
}

impl SampleName {
    pub fn new(participant: impl Into<String>, emotion: impl Into<String>, timestamp: f64) -> Self {
        Self {
            participant: participant.into(),
            emotion: emotion.into(),
            timestamp,
            extension: "png".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}{}.{}",
            self.participant,
            self.emotion,
            format_timestamp(self.timestamp),
            CROPPED_SUFFIX,
            self.extension
        )
    }

    pub fn parse(name: &str) -> Result<Self> {
        let caps = SAMPLE_NAME.captures(name).ok_or_else(|| {
            PipelineError::filename(name, "expected {participant}_{emotion}_{time}_c.{png|jpg}")
        })?;
        Ok(Self {
            participant: caps["participant"].to_string(),
            emotion: caps["emotion"].to_string(),
            timestamp: parse_time_capture(name, &caps["time"])?,
            extension: caps["ext"].to_string(),
        })
    }
}

impl fmt::Display for SampleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Extracts the timestamp from any `..._{time}_c.(png|jpg)` filename.
pub fn parse_timestamp(name: &str) -> Result<f64> {
    let caps = SAMPLE_TIME
        .captures(name)
        .ok_or_else(|| PipelineError::filename(name, "no timestamp in filename"))?;
    parse_time_capture(name, &caps["time"])
}

fn parse_time_capture(name: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|err| PipelineError::filename(name, format!("bad timestamp {raw:?}: {err}")))
}

/// Renders a time offset the way it is embedded in filenames: shortest
/// round-trip form, always with a decimal point (`2.0`, `0.5`, `4.97`).
pub fn format_timestamp(seconds: f64) -> String {
    let mut rendered = seconds.to_string();
    if !rendered.contains('.') {
        rendered.push_str(".0");
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_rejects_inverted_corners() {
        assert!(Region::new(Point::new(10, 10), Point::new(5, 20)).is_err());
        assert!(Region::new(Point::new(10, 10), Point::new(20, 10)).is_err());
    }

    #[test]
    fn centered_region_for_larger_image() {
        let region = Region::centered(640, 480, Resolution::new(224, 224)).unwrap();
        assert_eq!(region.top_left(), Point::new(208, 128));
        assert_eq!(region.bottom_right(), Point::new(432, 352));
    }

    #[test]
    fn centered_region_shrinks_for_small_image() {
        let region = Region::centered(100, 300, Resolution::new(224, 224)).unwrap();
        assert_eq!(region.width(), 100);
        assert_eq!(region.height(), 224);
        assert_eq!(region.top_left(), Point::new(0, 38));
    }

    #[test]
    fn region_deserialization_validates() {
        let ok: Region = serde_json::from_str(
            r#"{"top_left":{"x":1,"y":2},"bottom_right":{"x":30,"y":40}}"#,
        )
        .unwrap();
        assert_eq!(ok.width(), 29);
        let bad = serde_json::from_str::<Region>(
            r#"{"top_left":{"x":50,"y":2},"bottom_right":{"x":30,"y":40}}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn sample_name_round_trips() {
        let name = SampleName::new("ab", "happy", 2.0);
        assert_eq!(name.file_name(), "ab_happy_2.0_c.png");
        assert_eq!(SampleName::parse(&name.file_name()).unwrap(), name);

        let jpg = SampleName::new("a_b", "sad", 4.97).with_extension("jpg");
        assert_eq!(SampleName::parse(&jpg.file_name()).unwrap(), jpg);
    }

    #[test]
    fn timestamp_parsing_requires_decimal_and_suffix() {
        assert_eq!(parse_timestamp("ab_joy_12.5_c.png").unwrap(), 12.5);
        assert_eq!(parse_timestamp("video_0.0_c.jpg").unwrap(), 0.0);
        assert!(parse_timestamp("image_0_happy.jpg").is_err());
        assert!(parse_timestamp("ab_joy_12_c.png").is_err());
        assert!(parse_timestamp("ab_joy_12.5.png").is_err());
    }

    #[test]
    fn timestamps_render_with_decimal_point() {
        assert_eq!(format_timestamp(0.0), "0.0");
        assert_eq!(format_timestamp(2.0), "2.0");
        assert_eq!(format_timestamp(0.1), "0.1");
        assert_eq!(format_timestamp(4.97), "4.97");
    }
}
