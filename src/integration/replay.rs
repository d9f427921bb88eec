//! Offline tracker replay from a JSON-lines detection log.
//!
//! One record per line:
//!
//! ```text
//! {"t": 0.033, "detections": [{"bbox": [10, 20, 50, 80], "id": 7, "class": 49}], "names": {"49": "orange"}}
//! ```
//!
//! `names` only needs to appear once; later records reuse it. A detection
//! without `id` leaves the whole record untracked.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::frame::Frame;
use crate::fusion::Rect;
use crate::integration::detector::{TrackSource, TrackedDetection, TrackedFrame};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read replay log {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: invalid record")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: timestamp {t} goes backwards")]
    NonMonotonic { line: usize, t: f64 },
}

#[derive(Debug, Clone, Deserialize)]
struct RawDetection {
    bbox: [f32; 4],
    #[serde(default)]
    id: Option<u64>,
    class: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRecord {
    t: f64,
    #[serde(default)]
    detections: Vec<RawDetection>,
    #[serde(default)]
    names: HashMap<u32, String>,
}

/// [`TrackSource`] that plays back a recorded detection log, one record per
/// call to `track`.
#[derive(Debug, Default)]
pub struct ReplaySource {
    records: VecDeque<RawRecord>,
    names: HashMap<u32, String>,
    last_time: Option<f64>,
}

impl ReplaySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file)).map_err(|err| match err {
            ReplayError::Io { source, .. } => ReplayError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse every record up front. Blank lines are ignored.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, ReplayError> {
        let mut records = VecDeque::new();
        let mut prev_t = f64::NEG_INFINITY;

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|source| ReplayError::Io {
                path: PathBuf::new(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RawRecord =
                serde_json::from_str(&line).map_err(|source| ReplayError::Parse {
                    line: line_no,
                    source,
                })?;
            if !record.t.is_finite() || record.t < prev_t {
                return Err(ReplayError::NonMonotonic {
                    line: line_no,
                    t: record.t,
                });
            }
            prev_t = record.t;
            records.push_back(record);
        }

        Ok(Self {
            records,
            ..Self::default()
        })
    }

    /// Timestamp of the record the next `track` call will return.
    pub fn peek_time(&self) -> Option<f64> {
        self.records.front().map(|r| r.t)
    }

    /// Timestamp of the most recently returned record.
    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    pub fn is_finished(&self) -> bool {
        self.records.is_empty()
    }
}

impl TrackSource for ReplaySource {
    type Error = ReplayError;

    /// Returns the next record. The frame is ignored; `Ok(None)` for records
    /// without detections and once the log is exhausted.
    fn track(&mut self, _frame: &Frame) -> Result<Option<TrackedFrame>, Self::Error> {
        let Some(record) = self.records.pop_front() else {
            return Ok(None);
        };
        self.last_time = Some(record.t);
        self.names.extend(record.names);

        if record.detections.is_empty() {
            return Ok(None);
        }
        let detections = record
            .detections
            .into_iter()
            .map(|d| {
                let [x1, y1, x2, y2] = d.bbox;
                TrackedDetection {
                    bbox: Rect::from_tlbr(x1, y1, x2, y2),
                    track_id: d.id,
                    class_id: d.class,
                }
            })
            .collect();
        Ok(Some(TrackedFrame::new(detections, self.names.clone())))
    }
}
