use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use affectprep::config::{LabelMode, PipelineConfig};
use affectprep::face::{extract_frames, FixedRegion, FrameSource, RegionAnnotator, RegionRecord};
use affectprep::partition::manifest::count_images;
use affectprep::partition::write_times;
use affectprep::pipeline::{crop_directory, process_videos, video_timestamps, ProcessOptions};
use affectprep::types::{Point, Region, Resolution};
use affectprep::{ErrorPolicy, PipelineError, Result};
use image::{GenericImageView, Rgb, RgbImage};
use tempfile::TempDir;

/// Stands in for a decoder: every frame is a flat image whose shade encodes
/// its offset.
struct SyntheticVideo {
    duration: f64,
    requested: RefCell<Vec<f64>>,
}

impl SyntheticVideo {
    fn new(duration: f64) -> Self {
        Self {
            duration,
            requested: RefCell::new(Vec::new()),
        }
    }
}

impl FrameSource for SyntheticVideo {
    fn duration(&self, _video: &Path) -> Result<f64> {
        Ok(self.duration)
    }

    fn save_frame(&self, _video: &Path, offset: f64, output: &Path) -> Result<()> {
        self.requested.borrow_mut().push(offset);
        let shade = (offset * 20.0).min(255.0) as u8;
        RgbImage::from_pixel(40, 30, Rgb([shade, shade, shade])).save(output)?;
        Ok(())
    }
}

struct BrokenAnnotator;

impl RegionAnnotator for BrokenAnnotator {
    fn annotate(&self, _image: &Path) -> Result<Option<Region>> {
        Err(PipelineError::InvalidRegion("annotation window closed".into()))
    }
}

fn touch_video(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"not really a video").unwrap();
    path
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.ends_with(".png"))
        .collect();
    names.sort();
    names
}

#[test]
fn stride_two_extracts_offsets_zero_and_two() -> Result<()> {
    let tmp = TempDir::new().unwrap();
    let video = touch_video(tmp.path(), "ab_joy.mp4");
    let source = SyntheticVideo::new(10.0);
    let out = tmp.path().join("frames");

    let frames = extract_frames(
        &source,
        &video,
        &[1000.0, 2000.0, 3000.0],
        &out,
        2,
        ErrorPolicy::Strict,
    )?;

    let offsets: Vec<f64> = frames.iter().map(|frame| frame.offset).collect();
    assert_eq!(offsets, vec![0.0, 2.0]);
    assert_eq!(*source.requested.borrow(), vec![0.0, 2.0]);
    assert_eq!(names(&out), vec!["ab_joy_0.0.png", "ab_joy_2.0.png"]);
    assert!(frames.iter().all(|frame| frame.source == video && frame.path.is_file()));
    Ok(())
}

#[test]
fn out_of_range_timestamp_aborts_before_writing() {
    let tmp = TempDir::new().unwrap();
    let video = touch_video(tmp.path(), "ab_joy.mp4");
    let source = SyntheticVideo::new(1.5);
    let out = tmp.path().join("frames");

    let err = extract_frames(
        &source,
        &video,
        &[0.0, 1000.0, 2000.0],
        &out,
        1,
        ErrorPolicy::Strict,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::FrameOutOfRange { offset, .. } if offset == 2.0));
    assert!(!out.exists());
    assert!(source.requested.borrow().is_empty());
}

#[test]
fn out_of_range_timestamp_is_skipped_when_lenient() -> Result<()> {
    let tmp = TempDir::new().unwrap();
    let video = touch_video(tmp.path(), "ab_joy.mp4");
    let source = SyntheticVideo::new(1.5);
    let out = tmp.path().join("frames");

    let frames = extract_frames(
        &source,
        &video,
        &[0.0, 1000.0, 2000.0],
        &out,
        1,
        ErrorPolicy::SkipAndLog,
    )?;
    assert_eq!(frames.len(), 2);
    assert_eq!(names(&out), vec!["ab_joy_0.0.png", "ab_joy_1.0.png"]);
    Ok(())
}

#[test]
fn rejects_bad_sources_and_timestamps() {
    let tmp = TempDir::new().unwrap();
    let source = SyntheticVideo::new(10.0);
    let out = tmp.path().join("frames");
    let text = touch_video(tmp.path(), "notes.txt");
    let video = touch_video(tmp.path(), "ab_joy.mov");
    let missing = tmp.path().join("missing.mp4");

    let cases: [(&Path, &[f64]); 4] = [
        (missing.as_path(), &[0.0]),
        (text.as_path(), &[0.0]),
        (video.as_path(), &[]),
        (video.as_path(), &[2000.0, 1000.0]),
    ];
    for (path, times) in cases {
        let err = extract_frames(&source, path, times, &out, 1, ErrorPolicy::Strict).unwrap_err();
        assert!(matches!(err, PipelineError::VideoSource { .. }), "{err:?}");
    }
}

#[test]
fn timestamp_table_takes_precedence_over_frame_rate() -> Result<()> {
    let tmp = TempDir::new().unwrap();
    let with_table = touch_video(tmp.path(), "ab_joy.mp4");
    let without = touch_video(tmp.path(), "cd_sad.mp4");
    write_times(&tmp.path().join("ab_joy_times.csv"), &[500.0, 1500.0])?;
    let source = SyntheticVideo::new(3.0);

    assert_eq!(video_timestamps(&source, &with_table, 1.0)?, vec![500.0, 1500.0]);
    assert_eq!(
        video_timestamps(&source, &without, 2.0)?,
        vec![0.0, 500.0, 1000.0, 1500.0, 2000.0, 2500.0]
    );
    Ok(())
}

#[test]
fn stored_region_is_used_and_failed_annotation_falls_back() -> Result<()> {
    let tmp = TempDir::new().unwrap();
    let video = touch_video(tmp.path(), "ab_joy.mp4");
    let frames = tmp.path().join("ab_joy");
    extract_frames(
        &SyntheticVideo::new(5.0),
        &video,
        &[0.0, 1000.0, 2000.0],
        &frames,
        1,
        ErrorPolicy::Strict,
    )?;
    let mut config = PipelineConfig::default();
    config.crop.resolution = Resolution::new(12, 10);

    let region = Region::new(Point::new(5, 5), Point::new(25, 20))?;
    let record = RegionRecord::store(&frames, &region)?;
    assert_eq!(RegionRecord.annotate(&frames.join("ab_joy_1.0.png"))?, Some(region));

    let cropped = crop_directory(&frames, &config, &RegionRecord)?;
    assert_eq!(cropped.len(), 3);
    assert!(record.is_file());
    for path in &cropped {
        assert_eq!(image::open(path)?.dimensions(), (12, 10));
    }

    let fallback = crop_directory(&frames, &config, &BrokenAnnotator)?;
    assert_eq!(fallback, cropped);
    Ok(())
}

#[test]
fn process_videos_runs_extract_crop_and_partition() -> Result<()> {
    let tmp = TempDir::new().unwrap();
    let videos = tmp.path().join("videos");
    fs::create_dir_all(&videos).unwrap();
    touch_video(&videos, "ab_joy.mp4");
    touch_video(&videos, "cd_sad.mp4");
    write_times(
        &videos.join("ab_joy_times.csv"),
        &[10_000.0, 11_000.0, 12_000.0, 13_000.0, 14_000.0],
    )?;
    let output = tmp.path().join("output");

    let mut config = PipelineConfig::default();
    config.crop.resolution = Resolution::new(16, 16);
    let partition = process_videos(
        &videos,
        &output,
        &config,
        &SyntheticVideo::new(10.0),
        &FixedRegion(None),
        &ProcessOptions::new(LabelMode::Binary),
    )?;

    assert_eq!(names(&videos.join("ab_joy")).len(), 5);
    assert_eq!(names(&videos.join("cd_sad")).len(), 10);
    assert!(videos.join("ab_joy").join("cropped").join("ab_joy_4.0_c.png").is_file());

    let placed = |category: &str| -> usize {
        ["train", "val", "test"]
            .iter()
            .map(|split| count_images(partition.path(split, category).unwrap()).unwrap())
            .sum()
    };
    assert_eq!(placed("positive"), 5);
    assert_eq!(placed("negative"), 10);
    assert_eq!(count_images(&output.join("participants").join("cd").join("negative"))?, 2);
    Ok(())
}

#[test]
fn process_videos_can_reuse_existing_frames() -> Result<()> {
    let tmp = TempDir::new().unwrap();
    let videos = tmp.path().join("videos");
    let frames = videos.join("ab_joy");
    fs::create_dir_all(&frames).unwrap();
    touch_video(&videos, "ab_joy.mp4");
    for offset in ["0.0", "1.0"] {
        RgbImage::from_pixel(30, 30, Rgb([1, 2, 3])).save(frames.join(format!("ab_joy_{offset}.png")))?;
    }

    let source = SyntheticVideo::new(10.0);
    let mut options = ProcessOptions::new(LabelMode::Multiclass);
    options.extract_frames = false;
    let output = tmp.path().join("output");
    process_videos(
        &videos,
        &output,
        &PipelineConfig::default(),
        &source,
        &FixedRegion(None),
        &options,
    )?;

    assert!(source.requested.borrow().is_empty());
    let placed: usize = ["train", "val", "test"]
        .iter()
        .map(|split| count_images(&output.join(split).join("joy")).unwrap())
        .sum();
    assert_eq!(placed, 2);
    Ok(())
}
