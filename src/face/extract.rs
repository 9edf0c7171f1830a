//! Timestamp-keyed frame extraction.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ErrorPolicy, PipelineError, Result};
use crate::types::{format_timestamp, Frame};

/// Extensions accepted as video sources.
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "avi", "mkv", "webm"];

/// Decodes single frames out of a video.
pub trait FrameSource {
    /// Duration of the video in seconds.
    fn duration(&self, video: &Path) -> Result<f64>;

    /// Writes the frame shown at `offset` seconds to `output`.
    fn save_frame(&self, video: &Path, offset: f64, output: &Path) -> Result<()>;
}

/// `FrameSource` backed by the ffmpeg/ffprobe command-line tools.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl Default for FfmpegFrameSource {
    /// Bare tool names, resolved against `PATH` when run.
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegFrameSource {
    /// Locates `ffmpeg` and `ffprobe` on `PATH`.
    pub fn locate() -> Result<Self> {
        let find = |tool: &str| {
            which::which(tool).map_err(|_| PipelineError::Decoder {
                message: format!("{tool} not found in PATH"),
                stderr: None,
            })
        };
        Ok(Self {
            ffmpeg: find("ffmpeg")?,
            ffprobe: find("ffprobe")?,
        })
    }

    fn run(&self, command: &mut Command, what: &str) -> Result<Vec<u8>> {
        let output = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| PipelineError::Decoder {
                message: format!("failed to launch {what}: {err}"),
                stderr: None,
            })?;
        if !output.status.success() {
            return Err(PipelineError::Decoder {
                message: format!("{what} exited with {}", output.status),
                stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
            });
        }
        Ok(output.stdout)
    }
}

impl FrameSource for FfmpegFrameSource {
    fn duration(&self, video: &Path) -> Result<f64> {
        let stdout = self.run(
            Command::new(&self.ffprobe)
                .args(["-v", "quiet", "-print_format", "json", "-show_format"])
                .arg(video),
            "ffprobe",
        )?;
        let probe: ProbeOutput = serde_json::from_slice(&stdout)?;
        probe
            .format
            .duration
            .and_then(|raw| raw.parse::<f64>().ok())
            .ok_or_else(|| PipelineError::VideoSource {
                path: video.to_path_buf(),
                reason: "ffprobe reported no duration".to_string(),
            })
    }

    fn save_frame(&self, video: &Path, offset: f64, output: &Path) -> Result<()> {
        self.run(
            Command::new(&self.ffmpeg)
                .args(["-v", "error", "-y", "-ss", &format!("{offset:.6}"), "-i"])
                .arg(video)
                .args(["-frames:v", "1"])
                .arg(output),
            "ffmpeg",
        )?;
        if !output.is_file() {
            return Err(PipelineError::Decoder {
                message: format!("ffmpeg wrote no frame for offset {offset}s"),
                stderr: None,
            });
        }
        Ok(())
    }
}

/// Checks that `video` exists, is a file and carries a video extension.
pub fn validate_video(video: &Path) -> Result<()> {
    let reason = if !video.exists() {
        Some("video does not exist")
    } else if !video.is_file() {
        Some("video is not a file")
    } else if !is_video_file(video) {
        Some("unrecognized video extension")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(PipelineError::VideoSource {
            path: video.to_path_buf(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Relative offsets (seconds) for every `inclusion_rate`-th timestamp (ms),
/// measured from the first timestamp.
pub fn frame_offsets(times: &[f64], inclusion_rate: usize) -> Vec<f64> {
    let Some(&first) = times.first() else {
        return Vec::new();
    };
    times
        .iter()
        .step_by(inclusion_rate.max(1))
        .map(|&time| (time - first) / 1000.0)
        .collect()
}

/// Timestamps (ms) every `1 / frame_rate` seconds across a video's duration.
pub fn synthesize_timestamps(duration: f64, frame_rate: f64) -> Vec<f64> {
    let step_ms = 1000.0 / frame_rate;
    let end_ms = duration * 1000.0;
    (0..)
        .map(|i| i as f64 * step_ms)
        .take_while(|&time| time < end_ms)
        .collect()
}

/// Saves one frame per retained timestamp to `output_dir`, named
/// `{video_stem}_{offset}.png`, and returns them in timestamp order.
///
/// Existing files are overwritten. Offsets beyond the video's duration abort
/// the batch before any frame is written under `ErrorPolicy::Strict`, and are
/// skipped under `ErrorPolicy::SkipAndLog`.
pub fn extract_frames(
    source: &dyn FrameSource,
    video: &Path,
    times: &[f64],
    output_dir: &Path,
    inclusion_rate: usize,
    out_of_range: ErrorPolicy,
) -> Result<Vec<Frame>> {
    validate_video(video)?;
    let invalid_times = |reason: &str| PipelineError::VideoSource {
        path: video.to_path_buf(),
        reason: reason.to_string(),
    };
    if times.is_empty() {
        return Err(invalid_times("no timestamps requested"));
    }
    if times.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(invalid_times("timestamps must be ascending"));
    }
    if inclusion_rate == 0 {
        return Err(invalid_times("inclusion rate must be at least 1"));
    }

    let duration = source.duration(video)?;
    let mut offsets = Vec::new();
    for offset in frame_offsets(times, inclusion_rate) {
        if offset >= duration {
            out_of_range.handle(PipelineError::FrameOutOfRange { offset, duration })?;
            continue;
        }
        offsets.push(offset);
    }

    fs::create_dir_all(output_dir).map_err(PipelineError::io(output_dir))?;
    let stem = video
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| invalid_times("video name is not valid UTF-8"))?;

    let mut frames = Vec::with_capacity(offsets.len());
    for offset in offsets {
        let path = output_dir.join(format!("{stem}_{}.png", format_timestamp(offset)));
        source.save_frame(video, offset, &path)?;
        debug!(offset, path = %path.display(), "frame saved");
        frames.push(Frame {
            source: video.to_path_buf(),
            offset,
            path,
        });
    }
    info!(
        video = %video.display(),
        frames = frames.len(),
        "frame extraction finished"
    );
    Ok(frames)
}
