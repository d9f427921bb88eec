//! Traits for the external tracker and crop classifier.

use std::collections::HashMap;

use crate::frame::{Crop, Frame};
use crate::fusion::Rect;

/// One tracked detection in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDetection {
    /// Bounding box in frame pixels, may extend past the frame
    pub bbox: Rect,
    /// Track identifier, `None` when the tracker did not assign one
    pub track_id: Option<u64>,
    /// Detector class id
    pub class_id: u32,
}

impl TrackedDetection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, track_id: u64, class_id: u32) -> Self {
        Self {
            bbox: Rect::from_tlbr(x1, y1, x2, y2),
            track_id: Some(track_id),
            class_id,
        }
    }
}

/// Tracker output for a single frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedFrame {
    pub detections: Vec<TrackedDetection>,
    /// Class id to class name mapping
    pub class_names: HashMap<u32, String>,
}

impl TrackedFrame {
    pub fn new(detections: Vec<TrackedDetection>, class_names: HashMap<u32, String>) -> Self {
        Self {
            detections,
            class_names,
        }
    }

    /// True when ids were not assigned, which leaves nothing to process.
    pub fn is_untracked(&self) -> bool {
        self.detections.iter().any(|d| d.track_id.is_none())
    }

    /// Class name for `class_id`, falling back to the id itself.
    pub fn class_name(&self, class_id: u32) -> String {
        self.class_names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }
}

/// Trait for the object detection and tracking engine.
///
/// Implement this trait to connect any tracker to the decision pipeline.
///
/// # Example
///
/// ```ignore
/// use trackfuse_rs::{Frame, TrackSource, TrackedFrame};
///
/// struct MyTracker {
///     // Your model here
/// }
///
/// impl TrackSource for MyTracker {
///     type Error = std::io::Error;
///
///     fn track(&mut self, frame: &Frame) -> Result<Option<TrackedFrame>, Self::Error> {
///         // Run detection + tracking
///         Ok(None)
///     }
/// }
/// ```
pub trait TrackSource {
    /// Error type for tracking failures.
    type Error: std::fmt::Display;

    /// Run detection and tracking on a frame.
    ///
    /// Returns `Ok(None)` when nothing was found.
    fn track(&mut self, frame: &Frame) -> Result<Option<TrackedFrame>, Self::Error>;
}

/// Result of classifying one crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label_id: u32,
    pub confidence: f32,
}

impl Classification {
    pub fn new(label_id: u32, confidence: f32) -> Self {
        Self {
            label_id,
            confidence,
        }
    }
}

/// Trait for the binary crop classifier.
pub trait CropClassifier {
    /// Error type for classification failures.
    type Error: std::fmt::Display;

    /// Classify a small batch of crops, one result per crop in order.
    fn classify_batch(&mut self, crops: &[&Crop]) -> Result<Vec<Classification>, Self::Error>;
}

/// Classifier that never produces a result, for pipelines run without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClassifier;

impl CropClassifier for NoClassifier {
    type Error = std::convert::Infallible;

    fn classify_batch(&mut self, _crops: &[&Crop]) -> Result<Vec<Classification>, Self::Error> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untracked_frame() {
        let mut frame = TrackedFrame::new(
            vec![TrackedDetection::new(0.0, 0.0, 10.0, 10.0, 1, 0)],
            HashMap::new(),
        );
        assert!(!frame.is_untracked());

        frame.detections.push(TrackedDetection {
            bbox: Rect::new(0.0, 0.0, 5.0, 5.0),
            track_id: None,
            class_id: 0,
        });
        assert!(frame.is_untracked());
    }

    #[test]
    fn test_class_name_fallback() {
        let frame = TrackedFrame::new(vec![], HashMap::from([(49, "orange".to_string())]));
        assert_eq!(frame.class_name(49), "orange");
        assert_eq!(frame.class_name(3), "3");
    }
}
