//! Error taxonomy shared by every pipeline stage.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Convenient alias for results returned by pipeline modules.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source {0:?} does not exist")]
    SourceNotFound(PathBuf),

    #[error("source folder {0:?} does not contain a 'cropped' directory")]
    MissingCroppedDir(PathBuf),

    #[error("malformed sample filename {name:?}: {reason}")]
    FilenameParse { name: String, reason: String },

    #[error("directory {0:?} does not match any emotion")]
    UnmatchedEmotion(String),

    #[error("segment {key} has {count} samples; at least two are needed to fit a curve")]
    InsufficientSamples { key: String, count: usize },

    #[error("samples for {key} cannot be interpolated: {reason}")]
    InvalidSamples { key: String, reason: String },

    #[error("invalid video source {path:?}: {reason}")]
    VideoSource { path: PathBuf, reason: String },

    #[error("frame offset {offset}s lies outside the video duration of {duration}s")]
    FrameOutOfRange { offset: f64, duration: f64 },

    #[error("invalid crop region: {0}")]
    InvalidRegion(String),

    #[error("segment name {0:?} has no emotion mapping")]
    UnknownSegment(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("frame decoder failed: {message}")]
    Decoder {
        message: String,
        stderr: Option<String>,
    },

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Wraps an I/O error with the path that produced it; meant for `map_err`.
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| Self::Io { path, source }
    }

    pub fn filename(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FilenameParse {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// How a batch operation reacts to a failure isolated to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort the enclosing call with the item's error.
    #[default]
    Strict,
    /// Log the item's error and continue with the rest of the batch.
    SkipAndLog,
}

impl ErrorPolicy {
    /// Returns `Err` under `Strict`; otherwise logs the error and returns `Ok`.
    pub fn handle(self, err: PipelineError) -> Result<()> {
        match self {
            Self::Strict => Err(err),
            Self::SkipAndLog => {
                tracing::warn!(error = %err, "skipping item");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_policy_propagates() {
        let err = PipelineError::UnknownSegment("9.mp4".into());
        assert!(ErrorPolicy::Strict.handle(err).is_err());
    }

    #[test]
    fn skip_policy_swallows() {
        let err = PipelineError::UnknownSegment("9.mp4".into());
        assert!(ErrorPolicy::SkipAndLog.handle(err).is_ok());
    }

    #[test]
    fn missing_source_names_path() {
        let err = PipelineError::SourceNotFound(PathBuf::from("/data/ab_joy"));
        assert!(err.to_string().contains("/data/ab_joy"));
    }
}
