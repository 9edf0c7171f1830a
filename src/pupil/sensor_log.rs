//! Raw eye-tracker stream: marker ids interleaved with left/right pupil
//! diameters (`MID:<id>,`, `LPD:<v>,`, `RPD:<v>,`).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{PipelineError, Result};

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"MID:(?P<id>\d+),").unwrap_or_else(|err| panic!("invalid marker pattern: {err}"))
});
static LEFT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"LPD:(?P<value>[0-9.eE+\-]+),")
        .unwrap_or_else(|err| panic!("invalid left pupil pattern: {err}"))
});
static RIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"RPD:(?P<value>[0-9.eE+\-]+),")
        .unwrap_or_else(|err| panic!("invalid right pupil pattern: {err}"))
});

/// Averaged pupil diameters bucketed by the emotion of the active marker.
pub type EmotionDilations = BTreeMap<String, Vec<f64>>;

/// Every right-pupil reading closes a sample: it is averaged with the most
/// recent left-pupil reading and filed under the current marker's emotion.
/// Readings under unmapped markers are dropped.
pub fn parse_sensor_stream<R: BufRead>(
    reader: R,
    marker_emotions: &BTreeMap<u32, String>,
) -> Result<EmotionDilations> {
    let mut dilations: EmotionDilations = marker_emotions
        .values()
        .map(|emotion| (emotion.clone(), Vec::new()))
        .collect();

    let mut marker = 0u32;
    let mut left = 0.0f64;
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(PipelineError::io("<sensor stream>"))?;
        if let Some(caps) = MARKER.captures(&line) {
            marker = parse_field(&caps["id"], index)?;
        } else if let Some(caps) = LEFT.captures(&line) {
            left = parse_field(&caps["value"], index)?;
        } else if let Some(caps) = RIGHT.captures(&line) {
            let right: f64 = parse_field(&caps["value"], index)?;
            if let Some(emotion) = marker_emotions.get(&marker) {
                if let Some(bucket) = dilations.get_mut(emotion) {
                    bucket.push((left + right) / 2.0);
                }
            }
        }
    }
    debug!(
        samples = dilations.values().map(Vec::len).sum::<usize>(),
        "sensor stream parsed"
    );
    Ok(dilations)
}

fn parse_field<T: std::str::FromStr>(raw: &str, line: usize) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|err: T::Err| PipelineError::InvalidSamples {
        key: format!("sensor line {}", line + 1),
        reason: format!("{raw:?}: {err}"),
    })
}

pub fn parse_sensor_file(
    path: &Path,
    marker_emotions: &BTreeMap<u32, String>,
) -> Result<EmotionDilations> {
    let file = File::open(path).map_err(PipelineError::io(path))?;
    parse_sensor_stream(BufReader::new(file), marker_emotions)
}

pub fn write_dilations(path: &Path, dilations: &EmotionDilations) -> Result<()> {
    let json = serde_json::to_vec_pretty(dilations)?;
    std::fs::write(path, json).map_err(PipelineError::io(path))
}
