//! Builder for creating TrackedDetection objects from various input formats.

use crate::fusion::Rect;
use crate::integration::detector::TrackedDetection;

/// Builder for creating `TrackedDetection` objects from various input formats.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: Rect,
    track_id: Option<u64>,
    class_id: u32,
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_xywh(cx, cy, w, h);
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, l: f32, t: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::new(l, t, w, h);
        self
    }

    /// Set the tracker-assigned id.
    pub fn track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }

    /// Set the detector class id.
    pub fn class_id(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    /// Build the final `TrackedDetection`.
    pub fn build(self) -> TrackedDetection {
        TrackedDetection {
            bbox: self.bbox,
            track_id: self.track_id,
            class_id: self.class_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .tlbr(10.0, 20.0, 50.0, 80.0)
            .track_id(7)
            .class_id(49)
            .build();

        assert_eq!(det, TrackedDetection::new(10.0, 20.0, 50.0, 80.0, 7, 49));
    }

    #[test]
    fn test_builder_without_id() {
        let det = DetectionBuilder::new().xywh(50.0, 50.0, 20.0, 10.0).build();
        assert_eq!(det.track_id, None);
        assert_eq!(det.bbox.to_tlbr(), [40.0, 45.0, 60.0, 55.0]);
    }
}
