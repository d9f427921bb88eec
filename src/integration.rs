//! Integration with the world outside the fusion core.
//!
//! This module defines the traits the tracker and classifier plug into, the
//! frame source, crop persistence, the actuator link and the
//! [`DecisionPipeline`] that ties them together.

mod actuator;
mod builder;
mod crop_sink;
mod detector;
mod frame_source;
mod pipeline;
mod replay;

pub use actuator::{
    ActuatorCommand, ActuatorError, ActuatorLink, BeltStatus, Connector, Delivery, DevicePath,
    MemoryConnector, SerialDevice,
};
pub use builder::DetectionBuilder;
pub use crop_sink::{CropKind, CropSink, DiskCropSink, MemoryCropSink, SavedCrop, SinkError};
pub use detector::{
    Classification, CropClassifier, NoClassifier, TrackSource, TrackedDetection, TrackedFrame,
};
pub use frame_source::{Capture, CaptureError, FrameSource, LatestFrame, ThreadedFrameSource};
pub use pipeline::{Crossing, DecisionPipeline, PipelineError, TickReport, Verdict};
pub use replay::{ReplayError, ReplaySource};
