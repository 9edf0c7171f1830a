//! Face-frame preparation: extraction from video, region annotation, and
//! crop/resize into the `cropped` directory the partitioner consumes.

pub mod annotate;
pub mod crop;
pub mod extract;

pub use annotate::{list_images, midpoint_frame, FixedRegion, RegionAnnotator, RegionRecord};
pub use crop::{crop_and_resize, crop_and_resize_image, CROPPED_DIR};
pub use extract::{extract_frames, FfmpegFrameSource, FrameSource};
