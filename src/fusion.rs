mod fusion_state;
mod rect;
mod registry;
mod track_buffer;

pub use fusion_state::{Category, FusionState};
pub use rect::{PixelBox, Rect};
pub use registry::{FusionError, RegistryConfig, TrackRegistry};
pub use track_buffer::{FinalizedTrack, TrackBuffer, UNKNOWN_CLASS};
