//! Emotion-keyed dataset partitioning.
//!
//! Every source directory is named `<participant>_<emotion>` and holds a
//! `cropped` subdirectory of samples. Each source is split on its own into
//! train/val/test so that every participant and emotion appears in every
//! split, and the resulting files are copied into
//! `output/<split>/<category>/` next to a `times.csv` manifest. Participant
//! holdouts live apart from the splits under `output/participants/`.

pub mod manifest;
pub mod split;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{EmotionTaxonomy, LabelMode, SplitConfig};
use crate::error::{ErrorPolicy, PipelineError, Result};
use crate::face::CROPPED_DIR;
use crate::types::{parse_timestamp, SampleName};

pub use manifest::{pair_manifest_name, read_times, write_times, TIMES_FILE};
pub use split::{split_files, SplitSets};

pub const TRAIN: &str = "train";
pub const VAL: &str = "val";
pub const TEST: &str = "test";
/// Split key used when files are not split.
pub const UNSPLIT: &str = "";
/// Root of the per-participant holdout tree.
pub const HOLDOUT_DIR: &str = "participants";

static SOURCE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<participant>\w+)_(?P<emotion>\w+)$")
        .unwrap_or_else(|err| panic!("invalid source directory pattern: {err}"))
});

/// Knobs for [`separate_images`].
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub mode: LabelMode,
    /// Split into train/val/test; otherwise everything lands in one level.
    pub split_files: bool,
    /// Also copy each source's test files into `output/participants/<participant>/`.
    pub split_participants: bool,
    pub split: SplitConfig,
    /// Reaction to a sample whose filename carries no timestamp.
    pub on_malformed: ErrorPolicy,
    /// Reaction to a source directory naming no known emotion.
    pub on_unmatched: ErrorPolicy,
}

impl PartitionOptions {
    pub fn new(mode: LabelMode) -> Self {
        Self {
            mode,
            split_files: true,
            split_participants: true,
            split: SplitConfig::default(),
            on_malformed: ErrorPolicy::Strict,
            on_unmatched: ErrorPolicy::SkipAndLog,
        }
    }

    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    pub fn with_split_files(mut self, split_files: bool) -> Self {
        self.split_files = split_files;
        self
    }

    pub fn with_split_participants(mut self, split_participants: bool) -> Self {
        self.split_participants = split_participants;
        self
    }

    pub fn with_malformed_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    pub fn with_unmatched_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_unmatched = policy;
        self
    }
}

type Leaves = BTreeMap<String, BTreeMap<String, PathBuf>>;

/// Destination directories: split name → category → path, plus the
/// participant holdouts keyed the same way by participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub splits: Leaves,
    pub holdouts: Leaves,
}

impl Partition {
    pub fn path(&self, split: &str, category: &str) -> Option<&Path> {
        lookup(&self.splits, split, category)
    }

    pub fn holdout(&self, participant: &str, category: &str) -> Option<&Path> {
        lookup(&self.holdouts, participant, category)
    }

    fn leaves(&self) -> impl Iterator<Item = &PathBuf> {
        self.splits
            .values()
            .chain(self.holdouts.values())
            .flat_map(BTreeMap::values)
    }
}

fn lookup<'a>(leaves: &'a Leaves, key: &str, category: &str) -> Option<&'a Path> {
    leaves
        .get(key)
        .and_then(|categories| categories.get(category))
        .map(PathBuf::as_path)
}

fn insert(leaves: &mut Leaves, key: &str, category: &str, path: PathBuf) {
    leaves
        .entry(key.to_string())
        .or_default()
        .insert(category.to_string(), path);
}

/// Participant and emotion parsed from a source directory's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLabel {
    pub participant: String,
    pub emotion: String,
}

impl SourceLabel {
    pub fn parse(dir: &Path) -> Option<Self> {
        let name = dir.file_name()?.to_str()?;
        let caps = SOURCE_NAME.captures(name)?;
        Some(Self {
            participant: caps["participant"].to_string(),
            emotion: caps["emotion"].to_string(),
        })
    }
}

#[derive(Debug, Clone)]
struct Sample {
    name: String,
    time: f64,
}

#[derive(Debug)]
struct SourcePlan {
    crop_dir: PathBuf,
    label: SourceLabel,
    category: String,
    batches: Vec<(&'static str, Vec<Sample>)>,
    holdout: Vec<Sample>,
}

/// Splits every source's cropped samples and copies them into `output_dir`.
///
/// All preconditions (sources exist, each has a `cropped` directory, every
/// filename parses under the strict policy) are checked before anything is
/// created, so a failing call leaves `output_dir` untouched.
pub fn separate_images(
    source_dirs: &[PathBuf],
    output_dir: &Path,
    taxonomy: &EmotionTaxonomy,
    options: &PartitionOptions,
) -> Result<Partition> {
    for source in source_dirs {
        if !source.exists() {
            return Err(PipelineError::SourceNotFound(source.clone()));
        }
    }
    for source in source_dirs {
        if !source.join(CROPPED_DIR).is_dir() {
            return Err(PipelineError::MissingCroppedDir(source.clone()));
        }
    }

    let mut plans = Vec::new();
    for source in source_dirs {
        if let Some(plan) = plan_source(source, taxonomy, options)? {
            plans.push(plan);
        }
    }

    let split_names: &[&str] = if options.split_files {
        &[TRAIN, VAL, TEST]
    } else {
        &[UNSPLIT]
    };
    let mut partition = Partition::default();
    for split in split_names {
        for category in taxonomy.categories(options.mode) {
            let path = leaf_dir(output_dir, split, category);
            fs::create_dir_all(&path).map_err(PipelineError::io(&path))?;
            insert(&mut partition.splits, split, category, path);
        }
    }

    let mut leaves = LeafManifests::default();
    for plan in &plans {
        info!(
            source = %plan.crop_dir.display(),
            participant = %plan.label.participant,
            category = %plan.category,
            "copying source"
        );
        for (split, samples) in &plan.batches {
            let dest = leaf_dir(output_dir, split, &plan.category);
            leaves.copy_batch(plan, samples, &dest)?;
        }
        if options.split_files && options.split_participants {
            let dest = holdout_dir(output_dir, &plan.label.participant, &plan.category);
            fs::create_dir_all(&dest).map_err(PipelineError::io(&dest))?;
            leaves.copy_batch(plan, &plan.holdout, &dest)?;
            insert(&mut partition.holdouts, &plan.label.participant, &plan.category, dest);
        }
    }
    leaves.flush_untouched(&partition)?;

    Ok(partition)
}

fn leaf_dir(output_dir: &Path, split: &str, category: &str) -> PathBuf {
    if split.is_empty() {
        output_dir.join(category)
    } else {
        output_dir.join(split).join(category)
    }
}

fn holdout_dir(output_dir: &Path, participant: &str, category: &str) -> PathBuf {
    output_dir.join(HOLDOUT_DIR).join(participant).join(category)
}

fn plan_source(
    source: &Path,
    taxonomy: &EmotionTaxonomy,
    options: &PartitionOptions,
) -> Result<Option<SourcePlan>> {
    debug!(source = %source.display(), "planning source folder");
    let label = SourceLabel::parse(source);
    let resolved = label.as_ref().and_then(|label| {
        taxonomy
            .category(&label.emotion, options.mode)
            .map(str::to_string)
    });
    let (Some(label), Some(category)) = (label, resolved) else {
        options
            .on_unmatched
            .handle(PipelineError::UnmatchedEmotion(source.display().to_string()))?;
        return Ok(None);
    };
    debug!(category = %category, "keyword matched");

    let crop_dir = source.join(CROPPED_DIR);
    let mut names = Vec::new();
    for entry in fs::read_dir(&crop_dir).map_err(PipelineError::io(&crop_dir))? {
        let entry = entry.map_err(PipelineError::io(&crop_dir))?;
        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => options.on_malformed.handle(PipelineError::filename(
                raw.to_string_lossy(),
                "filename is not valid UTF-8",
            ))?,
        }
    }
    names.sort();

    let mut samples = Vec::with_capacity(names.len());
    for name in names {
        match parse_timestamp(&name) {
            Ok(time) => samples.push(Sample { name, time }),
            Err(err) => options.on_malformed.handle(err)?,
        }
    }

    let (batches, holdout) = if options.split_files {
        let sets = split_files(&samples, &options.split);
        let holdout = sets.test.clone();
        (
            vec![(TRAIN, sets.train), (VAL, sets.val), (TEST, sets.test)],
            holdout,
        )
    } else {
        (vec![(UNSPLIT, samples)], Vec::new())
    };

    Ok(Some(SourcePlan {
        crop_dir,
        label,
        category,
        batches,
        holdout,
    }))
}

/// Running manifest contents for every leaf touched during one call, keyed
/// by manifest path and seeded from disk.
#[derive(Default)]
struct LeafManifests {
    times: HashMap<PathBuf, Vec<f64>>,
}

impl LeafManifests {
    fn copy_batch(&mut self, plan: &SourcePlan, samples: &[Sample], dest: &Path) -> Result<()> {
        let leaf_path = dest.join(TIMES_FILE);
        let pair_path = dest.join(pair_manifest_name(&plan.label.participant, &plan.label.emotion));
        let mut leaf = self.take(&leaf_path, dest, None)?;
        let mut pair = self.take(&pair_path, dest, Some(&plan.label))?;

        for sample in samples {
            let target = dest.join(&sample.name);
            let replaced = target.exists();
            fs::copy(plan.crop_dir.join(&sample.name), &target)
                .map_err(PipelineError::io(&target))?;
            if replaced {
                debug!(file = %sample.name, "replaced existing sample; manifest row kept");
            } else {
                leaf.push(sample.time);
                pair.push(sample.time);
            }
            debug!(file = %sample.name, dest = %dest.display(), "copied sample");
        }

        write_times(&leaf_path, &leaf)?;
        write_times(&pair_path, &pair)?;
        self.times.insert(leaf_path, leaf);
        self.times.insert(pair_path, pair);
        Ok(())
    }

    fn take(&mut self, manifest: &Path, dest: &Path, owner: Option<&SourceLabel>) -> Result<Vec<f64>> {
        match self.times.remove(manifest) {
            Some(rows) => Ok(rows),
            None => seed_manifest(manifest, dest, owner),
        }
    }

    /// Gives leaves no source contributed to an empty manifest.
    fn flush_untouched(&self, partition: &Partition) -> Result<()> {
        for path in partition.leaves() {
            let manifest = path.join(TIMES_FILE);
            if !self.times.contains_key(&manifest) && !manifest.exists() {
                write_times(&manifest, &[])?;
            }
        }
        Ok(())
    }
}

/// Reads a manifest and appends a row for every sample already in `dest`
/// that the manifest does not account for, e.g. after an interrupted run.
/// With an `owner`, only that participant/emotion's samples count.
fn seed_manifest(manifest: &Path, dest: &Path, owner: Option<&SourceLabel>) -> Result<Vec<f64>> {
    let mut rows = manifest::read_times_or_empty(manifest)?;
    let mut unaccounted: BTreeMap<u64, usize> = BTreeMap::new();
    for time in present_times(dest, owner)? {
        *unaccounted.entry(time.to_bits()).or_default() += 1;
    }
    for time in &rows {
        if let Some(count) = unaccounted.get_mut(&time.to_bits()) {
            *count = count.saturating_sub(1);
        }
    }

    let mut recovered = 0;
    for (bits, count) in unaccounted {
        rows.extend(std::iter::repeat(f64::from_bits(bits)).take(count));
        recovered += count;
    }
    if recovered > 0 {
        warn!(manifest = %manifest.display(), recovered, "added rows for samples missing from manifest");
    }
    Ok(rows)
}

/// Timestamps of the samples in a leaf directory.
fn present_times(dest: &Path, owner: Option<&SourceLabel>) -> Result<Vec<f64>> {
    let mut times = Vec::new();
    for entry in fs::read_dir(dest).map_err(PipelineError::io(dest))? {
        let entry = entry.map_err(PipelineError::io(dest))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !manifest::is_image_name(&name) {
            continue;
        }
        let time = match owner {
            None => parse_timestamp(&name).ok(),
            Some(label) => SampleName::parse(&name).ok().and_then(|sample| {
                (sample.participant == label.participant && sample.emotion == label.emotion)
                    .then_some(sample.timestamp)
            }),
        };
        times.extend(time);
    }
    Ok(times)
}
