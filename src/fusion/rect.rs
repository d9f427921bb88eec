use nalgebra::Point2;

/// Bounding box representation with format conversion utilities.
///
/// Boxes reported by trackers are floating point and may extend past the
/// frame; [`Rect::clip`] turns them into a [`PixelBox`] that can index a frame.
///
/// Supports two common input formats:
/// - TLBR: Top-Left X, Top-Left Y, Bottom-Right X, Bottom-Right Y
/// - XYWH: Center X, Center Y, Width, Height
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: f32,
    /// Top-left y coordinate
    pub y: f32,
    /// Width of the bounding box
    pub width: f32,
    /// Height of the bounding box
    pub height: f32,
}

impl Rect {
    /// Create a new Rect from top-left coordinates and dimensions (TLWH format).
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a Rect from TLBR format (top-left x, top-left y, bottom-right x, bottom-right y).
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Create a Rect from XYWH format (center x, center y, width, height).
    #[inline]
    pub fn from_xywh(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    /// Convert to TLBR format: (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Truncate to whole pixels and clamp to a `width` x `height` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clip(&self, width: usize, height: usize) -> Option<PixelBox> {
        let [x1, y1, x2, y2] = self.to_tlbr();
        let clamp = |v: f32, max: usize| -> usize {
            // Truncate toward zero first, like an integer cast of the raw box.
            let v = v.trunc();
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v as usize).min(max)
            }
        };

        let pixel_box = PixelBox {
            x1: clamp(x1, width),
            y1: clamp(y1, height),
            x2: clamp(x2, width),
            y2: clamp(y2, height),
        };

        if pixel_box.is_empty() {
            None
        } else {
            Some(pixel_box)
        }
    }
}

/// Integer box already clamped to frame bounds, TLBR with exclusive max.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl PixelBox {
    #[inline]
    pub fn width(&self) -> usize {
        self.x2.saturating_sub(self.x1)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.y2.saturating_sub(self.y1)
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Integer midpoint of the box, the point used for line crossing.
    #[inline]
    pub fn centroid(&self) -> Point2<f32> {
        Point2::new(
            ((self.x1 + self.x2) / 2) as f32,
            ((self.y1 + self.y2) / 2) as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_conversions() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);
    }

    #[test]
    fn test_from_tlbr() {
        let rect = Rect::from_tlbr(10.0, 20.0, 40.0, 60.0);
        assert_eq!(rect, Rect::new(10.0, 20.0, 30.0, 40.0));
    }

    #[test]
    fn test_from_xywh() {
        let rect = Rect::from_xywh(25.0, 40.0, 30.0, 40.0);
        assert!((rect.x - 10.0).abs() < 1e-6);
        assert!((rect.y - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_clip_inside() {
        let clipped = Rect::from_tlbr(10.7, 20.2, 40.9, 60.5).clip(100, 100).unwrap();
        assert_eq!(
            clipped,
            PixelBox {
                x1: 10,
                y1: 20,
                x2: 40,
                y2: 60
            }
        );
        assert_eq!(clipped.centroid(), Point2::new(25.0, 40.0));
    }

    #[test]
    fn test_clip_partially_outside() {
        let clipped = Rect::from_tlbr(-15.0, 90.0, 30.0, 130.0).clip(100, 100).unwrap();
        assert_eq!((clipped.x1, clipped.y1, clipped.x2, clipped.y2), (0, 90, 30, 100));
    }

    #[test]
    fn test_clip_outside_is_empty() {
        assert!(Rect::from_tlbr(120.0, 10.0, 150.0, 40.0).clip(100, 100).is_none());
        assert!(Rect::from_tlbr(-40.0, 10.0, -5.0, 40.0).clip(100, 100).is_none());
        // Degenerate after truncation
        assert!(Rect::from_tlbr(10.2, 10.0, 10.9, 40.0).clip(100, 100).is_none());
    }

    #[test]
    fn test_centroid_is_integer_midpoint() {
        let b = PixelBox {
            x1: 0,
            y1: 1,
            x2: 5,
            y2: 4,
        };
        assert_eq!(b.centroid(), Point2::new(2.0, 2.0));
    }
}
