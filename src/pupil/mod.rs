//! Pupillometry curve building: raw diameter logs are cut into stimulus
//! segments and each retained segment is fitted with a smooth interpolant.

pub mod curves;
pub mod segments;
pub mod sensor_log;
pub mod spline;

pub use curves::{
    curve_file_name, discover_participants, load_curves, process_data, process_participant,
    DilationCurve,
};
pub use segments::{segment_samples, RawSample, Segment, SegmentCursor, Segmentation};
pub use spline::CubicSpline;
