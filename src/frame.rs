//! Frame and crop buffers.
//!
//! Frames are stored as `(height, width, channels)` arrays in BGR order, the
//! layout produced by common capture backends.

use ndarray::{Array3, s};

use crate::fusion::PixelBox;

/// A full video frame, `(height, width, 3)` BGR.
pub type Frame = Array3<u8>;

/// An owned crop of a frame, same layout as [`Frame`].
pub type Crop = Array3<u8>;

/// Create a black frame of the given size.
pub fn blank_frame(width: usize, height: usize) -> Frame {
    Array3::zeros((height, width, 3))
}

/// Frame size as `(width, height)`.
#[inline]
pub fn frame_size(frame: &Frame) -> (usize, usize) {
    let (h, w, _) = frame.dim();
    (w, h)
}

/// Copy the region covered by `region` out of `frame`.
///
/// `region` must already be clipped to the frame (see [`crate::fusion::Rect::clip`]).
pub fn crop_frame(frame: &Frame, region: &PixelBox) -> Crop {
    frame
        .slice(s![region.y1..region.y2, region.x1..region.x2, ..])
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::Rect;

    #[test]
    fn test_crop_frame_shape() {
        let mut frame = blank_frame(64, 48);
        frame[[10, 20, 0]] = 255;

        let region = Rect::from_tlbr(20.0, 10.0, 30.0, 25.0).clip(64, 48).unwrap();
        let crop = crop_frame(&frame, &region);

        assert_eq!(crop.dim(), (15, 10, 3));
        assert_eq!(crop[[0, 0, 0]], 255);
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(frame_size(&blank_frame(1280, 720)), (1280, 720));
    }
}
