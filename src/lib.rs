//! Data preparation for multimodal emotion recognition: face frames are
//! extracted, cropped and partitioned; pupil-diameter logs become per-segment
//! curves; the two are fused into aligned (image, dilation window, label)
//! samples.

pub mod cli;
pub mod config;
pub mod error;
pub mod face;
pub mod fusion;
pub mod partition;
pub mod pipeline;
pub mod pupil;
pub mod types;

pub use error::{ErrorPolicy, PipelineError, Result};
