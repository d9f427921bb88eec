//! Virtual counting line (LineCounter) and its crossing test.

use std::collections::HashSet;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::counting::tallies::Tallies;
use crate::fusion::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOrientation {
    /// Line at a fixed y, spanning the frame width
    Horizontal,
    /// Line at a fixed x, spanning the frame height
    Vertical,
}

/// Direction of travel that counts as a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountDirection {
    /// y decreasing
    Up,
    /// y increasing
    Down,
    /// x decreasing
    Left,
    /// x increasing
    Right,
}

impl CountDirection {
    /// Whether the direction can be measured against a line of `orientation`.
    pub fn fits(self, orientation: LineOrientation) -> bool {
        matches!(
            (orientation, self),
            (LineOrientation::Horizontal, CountDirection::Up | CountDirection::Down)
                | (LineOrientation::Vertical, CountDirection::Left | CountDirection::Right)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("direction {direction:?} cannot be counted on a {orientation:?} line")]
    DirectionMismatch {
        orientation: LineOrientation,
        direction: CountDirection,
    },
    #[error("line position {0} is outside 0.0..=1.0")]
    PositionOutOfRange(f64),
}

/// Configuration for the CountingLine.
#[derive(Debug, Clone, Copy)]
pub struct LineConfig {
    pub orientation: LineOrientation,
    pub direction: CountDirection,
    /// Position as a fraction of the frame height (horizontal) or width (vertical)
    pub position: f64,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            orientation: LineOrientation::Horizontal,
            direction: CountDirection::Up,
            position: 0.5,
            frame_width: 1280,
            frame_height: 720,
        }
    }
}

/// Counts objects whose centroid crosses a line in one direction.
///
/// Each track id is credited at most once for the life of the line.
#[derive(Debug, Clone)]
pub struct CountingLine {
    config: LineConfig,
    line_pos: f32,
    counted_ids: HashSet<u64>,
    tallies: Tallies,
}

impl CountingLine {
    pub fn new(config: LineConfig) -> Result<Self, LineError> {
        if !config.direction.fits(config.orientation) {
            return Err(LineError::DirectionMismatch {
                orientation: config.orientation,
                direction: config.direction,
            });
        }
        check_position(config.position)?;

        let mut line = Self {
            config,
            line_pos: 0.0,
            counted_ids: HashSet::new(),
            tallies: Tallies::default(),
        };
        line.line_pos = line.pixel_position(config.position);
        Ok(line)
    }

    /// Test whether `track_id` moved across the line since `previous`.
    ///
    /// This is a one-sided threshold test on the two endpoints, not a segment
    /// intersection. Returns `false` for already counted ids and when there is
    /// no previous centroid. A crossing marks the id as counted.
    pub fn check_crossing(
        &mut self,
        track_id: u64,
        centroid: Point2<f32>,
        previous: Option<Point2<f32>>,
    ) -> bool {
        if self.counted_ids.contains(&track_id) {
            return false;
        }
        let Some(prev) = previous else {
            return false;
        };

        let line = self.line_pos;
        let crossed = match self.config.direction {
            CountDirection::Down => prev.y <= line && centroid.y > line,
            CountDirection::Up => prev.y >= line && centroid.y < line,
            CountDirection::Right => prev.x <= line && centroid.x > line,
            CountDirection::Left => prev.x >= line && centroid.x < line,
        };

        if crossed {
            self.counted_ids.insert(track_id);
            info!(track_id, line = line, "line crossed");
        }
        crossed
    }

    /// Add one object to the `category` tally and to the total.
    pub fn increment(&mut self, category: &str) {
        self.tallies.increment(category);
    }

    pub fn increment_category(&mut self, category: Category) {
        self.increment(category.as_str());
    }

    /// Snapshot of the current tallies.
    pub fn counts(&self) -> Tallies {
        self.tallies.clone()
    }

    /// Move the line to a new fraction of the frame.
    ///
    /// Ids already counted stay counted.
    pub fn set_line_position(&mut self, fraction: f64) -> Result<(), LineError> {
        check_position(fraction)?;
        self.config.position = fraction;
        self.line_pos = self.pixel_position(fraction);
        Ok(())
    }

    /// Line coordinate in pixels.
    pub fn line_position(&self) -> f32 {
        self.line_pos
    }

    pub fn is_counted(&self, track_id: u64) -> bool {
        self.counted_ids.contains(&track_id)
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Forget counted ids and zero the tallies.
    pub fn reset(&mut self) {
        self.counted_ids.clear();
        self.tallies.reset();
    }

    fn pixel_position(&self, fraction: f64) -> f32 {
        let extent = match self.config.orientation {
            LineOrientation::Horizontal => self.config.frame_height,
            LineOrientation::Vertical => self.config.frame_width,
        };
        (extent as f64 * fraction).trunc() as f32
    }
}

fn check_position(fraction: f64) -> Result<(), LineError> {
    if (0.0..=1.0).contains(&fraction) {
        Ok(())
    } else {
        Err(LineError::PositionOutOfRange(fraction))
    }
}
