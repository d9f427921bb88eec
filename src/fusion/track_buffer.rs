//! Per-object buffer (TrackBuffer) accumulated while a track is visible.

use std::collections::VecDeque;

use nalgebra::Point2;

use crate::frame::Crop;
use crate::fusion::fusion_state::{Category, FusionState};

/// Class name given to a buffer before the first detection labels it.
pub const UNKNOWN_CLASS: &str = "unknown";

/// State of a single tracked object.
#[derive(Debug, Clone)]
pub struct TrackBuffer {
    /// Externally assigned track identifier
    pub(crate) track_id: u64,
    /// Detector class name, set once from the first observation
    pub(crate) detected_class: Option<String>,
    /// Most recent crops, oldest first
    pub(crate) crops: VecDeque<Crop>,
    /// Maximum number of crops retained
    pub(crate) crop_capacity: usize,
    /// Sticky OR of all classification outcomes
    pub(crate) fusion: FusionState,
    /// Number of observations
    pub(crate) total_frames: u64,
    /// Number of crops classified positive
    pub(crate) positive_frames: u64,
    /// Number of crops classified negative
    pub(crate) negative_frames: u64,
    /// Timestamp of the most recent observation, in seconds
    pub(crate) last_seen: f64,
    /// Box center from the previous observation
    pub(crate) last_centroid: Option<Point2<f32>>,
    /// Set once the object has been counted by the line
    pub(crate) finalized: bool,
}

impl TrackBuffer {
    /// Create an empty buffer first seen at `now`.
    pub fn new(track_id: u64, crop_capacity: usize, now: f64) -> Self {
        Self {
            track_id,
            detected_class: None,
            crops: VecDeque::with_capacity(crop_capacity.min(16)),
            crop_capacity,
            fusion: FusionState::Unclassified,
            total_frames: 0,
            positive_frames: 0,
            negative_frames: 0,
            last_seen: now,
            last_centroid: None,
            finalized: false,
        }
    }

    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    /// Detected class, or [`UNKNOWN_CLASS`] if never labelled.
    pub fn detected_class(&self) -> &str {
        self.detected_class.as_deref().unwrap_or(UNKNOWN_CLASS)
    }

    /// Label the buffer with the detector class.
    ///
    /// Only the first call has an effect; returns whether it did.
    pub fn set_detected_class(&mut self, class_name: impl Into<String>) -> bool {
        if self.detected_class.is_some() {
            return false;
        }
        self.detected_class = Some(class_name.into());
        true
    }

    pub fn fusion(&self) -> FusionState {
        self.fusion
    }

    pub fn crops(&self) -> &VecDeque<Crop> {
        &self.crops
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn positive_frames(&self) -> u64 {
        self.positive_frames
    }

    pub fn negative_frames(&self) -> u64 {
        self.negative_frames
    }

    pub fn last_seen(&self) -> f64 {
        self.last_seen
    }

    pub fn last_centroid(&self) -> Option<Point2<f32>> {
        self.last_centroid
    }

    /// Store the newest centroid and return the one it replaces.
    pub fn replace_centroid(&mut self, centroid: Point2<f32>) -> Option<Point2<f32>> {
        self.last_centroid.replace(centroid)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Mark the object as counted by the line. One way.
    pub fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    /// Category this buffer would resolve to right now.
    pub fn category(&self, target_class: &str) -> Category {
        Category::resolve(self.detected_class(), target_class, self.fusion)
    }

    pub(crate) fn add_crop(&mut self, crop: Crop, now: f64) {
        if self.crop_capacity > 0 {
            if self.crops.len() == self.crop_capacity {
                self.crops.pop_front();
            }
            self.crops.push_back(crop);
        }
        self.total_frames += 1;
        self.last_seen = now;
    }

    pub(crate) fn record_classification(&mut self, positive: bool) {
        if positive {
            self.positive_frames += 1;
        } else {
            self.negative_frames += 1;
        }
        self.fusion = self.fusion.fold(positive);
    }
}

/// Immutable snapshot of a buffer removed by expiry.
#[derive(Debug, Clone)]
pub struct FinalizedTrack {
    buffer: TrackBuffer,
}

impl FinalizedTrack {
    pub fn track_id(&self) -> u64 {
        self.buffer.track_id
    }

    pub fn detected_class(&self) -> &str {
        self.buffer.detected_class()
    }

    pub fn fusion(&self) -> FusionState {
        self.buffer.fusion
    }

    pub fn crops(&self) -> &VecDeque<Crop> {
        &self.buffer.crops
    }

    pub fn total_frames(&self) -> u64 {
        self.buffer.total_frames
    }

    pub fn positive_frames(&self) -> u64 {
        self.buffer.positive_frames
    }

    pub fn negative_frames(&self) -> u64 {
        self.buffer.negative_frames
    }

    pub fn last_seen(&self) -> f64 {
        self.buffer.last_seen
    }

    /// Whether the object was counted by the line before it expired.
    pub fn was_counted(&self) -> bool {
        self.buffer.finalized
    }

    /// Final verdict for this object.
    pub fn category(&self, target_class: &str) -> Category {
        self.buffer.category(target_class)
    }
}

impl From<TrackBuffer> for FinalizedTrack {
    fn from(buffer: TrackBuffer) -> Self {
        Self { buffer }
    }
}
