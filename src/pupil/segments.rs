//! Segment tables, raw diameter logs, and the cursor that assigns log rows
//! to segments.

use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Stimulus interval in a recording, in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub start: f64,
    pub end: f64,
}

/// One raw diameter reading.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RawSample {
    #[serde(rename = "times")]
    pub time: f64,
    #[serde(rename = "diameters")]
    pub diameter: f64,
}

#[derive(Debug, Deserialize)]
struct SegmentRow {
    #[serde(rename = "segmentName")]
    name: String,
    #[serde(rename = "segmentStart")]
    start: f64,
    #[serde(rename = "segmentEnd")]
    end: f64,
}

/// Reads a `segmentName,segmentStart,segmentEnd` table (seconds) into
/// millisecond segments, keeping file order.
pub fn read_segments(path: &Path) -> Result<Vec<Segment>> {
    if !path.is_file() {
        return Err(PipelineError::SourceNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize::<SegmentRow>()
        .map(|row| {
            let row = row?;
            Ok(Segment {
                name: row.name,
                start: row.start * 1000.0,
                end: row.end * 1000.0,
            })
        })
        .collect()
}

/// Reads a `times,diameters` log, keeping file order.
pub fn read_raw_log(path: &Path) -> Result<Vec<RawSample>> {
    if !path.is_file() {
        return Err(PipelineError::SourceNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize::<RawSample>()
        .map(|row| Ok(row?))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Positioned on a segment, waiting for the next row.
    AwaitingRow,
    /// The last row ran past the current segment's end; moving on.
    SegmentExhausted,
    /// Every segment has been passed.
    Done,
}

/// Where a row landed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Inside segment `index`, at `relative_time` ms after its start.
    Segment { index: usize, relative_time: f64 },
    /// Before the start of segment `index` (a gap between segments).
    Gap { index: usize },
    /// After the last segment's end.
    PastEnd,
}

/// Walks an ordered segment table alongside a time-ordered log. The cursor
/// only moves forward: while a row's time exceeds the current segment's end
/// it advances one segment at a time.
#[derive(Debug, Clone)]
pub struct SegmentCursor<'a> {
    segments: &'a [Segment],
    index: usize,
    state: CursorState,
}

impl<'a> SegmentCursor<'a> {
    pub fn new(segments: &'a [Segment]) -> Self {
        let state = if segments.is_empty() {
            CursorState::Done
        } else {
            CursorState::AwaitingRow
        };
        Self {
            segments,
            index: 0,
            state,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn place(&mut self, time: f64) -> Placement {
        while self.state != CursorState::Done && time > self.segments[self.index].end {
            self.state = CursorState::SegmentExhausted;
            self.index += 1;
            if self.index == self.segments.len() {
                self.state = CursorState::Done;
            }
        }
        if self.state == CursorState::Done {
            return Placement::PastEnd;
        }
        self.state = CursorState::AwaitingRow;
        let segment = &self.segments[self.index];
        if time < segment.start {
            Placement::Gap { index: self.index }
        } else {
            Placement::Segment {
                index: self.index,
                relative_time: time - segment.start,
            }
        }
    }
}

/// Samples collected for one segment, times relative to its start.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSamples {
    pub segment: Segment,
    pub times: Vec<f64>,
    pub diameters: Vec<f64>,
}

/// Result of walking a log against a segment table.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// One entry per segment, in table order; empty when no row fell inside.
    pub segments: Vec<SegmentSamples>,
    /// Rows that fell between segments.
    pub gap_rows: usize,
    /// Rows recorded after the last segment.
    pub trailing_rows: usize,
}

pub fn segment_samples(segments: &[Segment], rows: &[RawSample]) -> Segmentation {
    let mut collected: Vec<SegmentSamples> = segments
        .iter()
        .map(|segment| SegmentSamples {
            segment: segment.clone(),
            times: Vec::new(),
            diameters: Vec::new(),
        })
        .collect();
    let mut gap_rows = 0;
    let mut trailing_rows = 0;

    let mut cursor = SegmentCursor::new(segments);
    for row in rows {
        match cursor.place(row.time) {
            Placement::Segment {
                index,
                relative_time,
            } => {
                collected[index].times.push(relative_time);
                collected[index].diameters.push(row.diameter);
            }
            Placement::Gap { .. } => gap_rows += 1,
            Placement::PastEnd => trailing_rows += 1,
        }
    }

    Segmentation {
        segments: collected,
        gap_rows,
        trailing_rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, start: f64, end: f64) -> Segment {
        Segment {
            name: name.to_string(),
            start,
            end,
        }
    }

    fn row(time: f64, diameter: f64) -> RawSample {
        RawSample { time, diameter }
    }

    #[test]
    fn assigns_rows_to_contiguous_segments() {
        let segments = vec![segment("1.mp4", 0.0, 1000.0), segment("2.mp4", 1000.0, 2000.0)];
        let rows = vec![
            row(100.0, 3.1),
            row(900.0, 3.2),
            row(1100.0, 4.0),
            row(1500.0, 4.1),
        ];
        let result = segment_samples(&segments, &rows);
        assert_eq!(result.segments[0].times, vec![100.0, 900.0]);
        assert_eq!(result.segments[0].diameters, vec![3.1, 3.2]);
        assert_eq!(result.segments[1].times, vec![100.0, 500.0]);
        assert_eq!(result.segments[1].diameters, vec![4.0, 4.1]);
        assert_eq!((result.gap_rows, result.trailing_rows), (0, 0));
    }

    #[test]
    fn skipped_segment_stays_empty() {
        let segments = vec![
            segment("1.mp4", 0.0, 1000.0),
            segment("transition", 1000.0, 1200.0),
            segment("2.mp4", 1200.0, 2000.0),
        ];
        let rows = vec![row(500.0, 3.0), row(1500.0, 3.5)];
        let result = segment_samples(&segments, &rows);
        assert_eq!(result.segments[0].times.len(), 1);
        assert!(result.segments[1].times.is_empty());
        assert_eq!(result.segments[2].times, vec![300.0]);
    }

    #[test]
    fn row_on_boundary_belongs_to_earlier_segment() {
        let segments = vec![segment("1.mp4", 0.0, 1000.0), segment("2.mp4", 1000.0, 2000.0)];
        let result = segment_samples(&segments, &[row(1000.0, 3.0)]);
        assert_eq!(result.segments[0].times, vec![1000.0]);
        assert!(result.segments[1].times.is_empty());
    }

    #[test]
    fn gaps_and_trailing_rows_are_counted() {
        let segments = vec![segment("1.mp4", 100.0, 200.0), segment("2.mp4", 300.0, 400.0)];
        let rows = vec![row(50.0, 1.0), row(150.0, 1.0), row(250.0, 1.0), row(450.0, 1.0)];
        let result = segment_samples(&segments, &rows);
        assert_eq!(result.gap_rows, 2);
        assert_eq!(result.trailing_rows, 1);
        assert_eq!(result.segments[0].times, vec![50.0]);
    }

    #[test]
    fn cursor_moves_through_states() {
        let segments = vec![segment("1.mp4", 0.0, 10.0)];
        let mut cursor = SegmentCursor::new(&segments);
        assert_eq!(cursor.state(), CursorState::AwaitingRow);
        assert!(matches!(cursor.place(5.0), Placement::Segment { index: 0, .. }));
        assert_eq!(cursor.state(), CursorState::AwaitingRow);
        assert_eq!(cursor.place(11.0), Placement::PastEnd);
        assert_eq!(cursor.state(), CursorState::Done);
        assert_eq!(cursor.place(1.0), Placement::PastEnd);

        assert_eq!(SegmentCursor::new(&[]).state(), CursorState::Done);
    }

    #[test]
    fn ascending_rows_get_non_negative_relative_times() {
        let segments: Vec<Segment> = (0..5)
            .map(|i| segment(&format!("{}.mp4", i + 1), i as f64 * 100.0, (i + 1) as f64 * 100.0))
            .collect();
        let rows: Vec<RawSample> = (0..500).map(|t| row(t as f64, 3.0)).collect();
        let result = segment_samples(&segments, &rows);
        let placed: usize = result.segments.iter().map(|s| s.times.len()).sum();
        assert_eq!(placed, rows.len());
        assert!(result
            .segments
            .iter()
            .flat_map(|s| s.times.iter())
            .all(|&t| t >= 0.0));
    }
}
