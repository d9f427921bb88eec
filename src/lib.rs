//! Tracking fusion for a sorting line.
//!
//! Per-frame tracked detections and per-crop classifications are fused into
//! one sticky verdict per physical object. A virtual line counts objects as
//! they cross it, and each object that leaves the scene is finalized exactly
//! once onto a bounded [`HandoffQueue`].

pub mod clock;
pub mod config;
pub mod counting;
pub mod frame;
pub mod fusion;
pub mod handoff;
pub mod integration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, PipelineConfig};
pub use counting::{CountDirection, CountingLine, LineConfig, LineOrientation, Tallies};
pub use frame::{Crop, Frame};
pub use fusion::{Category, FinalizedTrack, FusionError, FusionState, Rect, TrackRegistry};
pub use handoff::{HandoffQueue, QueueConsumer, QueueItem};
pub use integration::{
    CropClassifier, DecisionPipeline, DetectionBuilder, TickReport, TrackSource, TrackedDetection,
    TrackedFrame,
};
