//! Process-wide configuration read once at startup.
//!
//! Every field has a default, so a TOML file only needs to name what it
//! changes:
//!
//! ```toml
//! [line]
//! orientation = "horizontal"
//! position = 0.6
//! direction = "down"
//!
//! [tracking]
//! track_timeout = 1.5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::counting::{CountDirection, LineConfig, LineOrientation};
use crate::fusion::RegistryConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detection: DetectionConfig,
    pub frame: FrameConfig,
    pub line: LineSettings,
    pub tracking: TrackingConfig,
    pub classifier: ClassifierConfig,
    pub crop_log: CropLogConfig,
    pub queue: QueueConfig,
    pub actuator: ActuatorConfig,
    pub toggles: Toggles,
}

/// Options forwarded to the external detector/tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detector class name whose crops are classified
    pub target_class: String,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    /// Restrict detection to these class ids, all classes when unset
    pub class_ids: Option<Vec<u32>>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            target_class: "orange".to_string(),
            conf_threshold: 0.0,
            iou_threshold: 0.45,
            class_ids: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Camera index or video file path
    pub source: String,
    pub width: u32,
    pub height: u32,
    /// Target capture rate, used when the source does not report one
    pub fps: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            width: 1280,
            height: 720,
            fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSettings {
    pub orientation: LineOrientation,
    /// Fraction of the frame height (horizontal) or width (vertical)
    pub position: f64,
    pub direction: CountDirection,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            orientation: LineOrientation::Horizontal,
            position: 0.5,
            direction: CountDirection::Up,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Seconds a track may go unseen before it is finalized
    pub track_timeout: f64,
    /// Crops retained per track
    pub max_buffer_size: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            track_timeout: 2.0,
            max_buffer_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabel {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub batch_size: usize,
    /// Names of the classifier's output labels
    pub labels: Vec<ClassLabel>,
    /// Label id that marks a crop as positive (rotten)
    pub positive_label: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            labels: vec![
                ClassLabel {
                    id: 0,
                    name: "fresh".to_string(),
                },
                ClassLabel {
                    id: 1,
                    name: "rotten".to_string(),
                },
            ],
            positive_label: 1,
        }
    }
}

impl ClassifierConfig {
    /// Configured name of a classifier label id.
    pub fn label_name(&self, id: u32) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.id == id)
            .map(|label| label.name.as_str())
    }
}

/// Where crops are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropLogConfig {
    /// Crops of non-target detections, always written
    pub non_target_dir: PathBuf,
    /// Every crop, written while `save_all_crops` is on
    pub crops_dir: PathBuf,
}

impl Default for CropLogConfig {
    fn default() -> Self {
        Self {
            non_target_dir: PathBuf::from("logs/non_orange"),
            crops_dir: PathBuf::from("logs/crops"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_size: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Device node of the actuator's serial line
    pub port: PathBuf,
    pub baud_rate: u32,
    /// Read/write timeout of the serial line, in milliseconds
    pub timeout_ms: u64,
    /// Pause after opening the line before the first write, in milliseconds.
    /// Boards that reset on open need this.
    pub settle_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            port: PathBuf::from("/dev/ttyUSB0"),
            baud_rate: 115_200,
            timeout_ms: 1000,
            settle_ms: 2000,
        }
    }
}

/// Initial state of the runtime switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggles {
    pub detection_enabled: bool,
    pub classification_enabled: bool,
    pub save_all_crops: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            classification_enabled: true,
            save_all_crops: false,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if self.frame.width == 0 || self.frame.height == 0 {
            return invalid("frame width and height must be positive".into());
        }
        if !(self.frame.fps.is_finite() && self.frame.fps > 0.0) {
            return invalid(format!("frame.fps must be positive, got {}", self.frame.fps));
        }
        if !(0.0..=1.0).contains(&self.line.position) {
            return invalid(format!(
                "line.position must be within 0.0..=1.0, got {}",
                self.line.position
            ));
        }
        if !self.line.direction.fits(self.line.orientation) {
            return invalid(format!(
                "line.direction {:?} does not fit a {:?} line",
                self.line.direction, self.line.orientation
            ));
        }
        if !(self.tracking.track_timeout.is_finite() && self.tracking.track_timeout >= 0.0) {
            return invalid(format!(
                "tracking.track_timeout must be non-negative, got {}",
                self.tracking.track_timeout
            ));
        }
        if self.queue.max_size == 0 {
            return invalid("queue.max_size must be at least 1".into());
        }
        if self.classifier.batch_size == 0 {
            return invalid("classifier.batch_size must be at least 1".into());
        }
        if self.classifier.labels.len() != 2 {
            return invalid(format!(
                "classifier.labels must name exactly two labels, got {}",
                self.classifier.labels.len()
            ));
        }
        if self.classifier.labels[0].id == self.classifier.labels[1].id {
            return invalid("classifier.labels ids must differ".into());
        }
        if self
            .classifier
            .label_name(self.classifier.positive_label)
            .is_none()
        {
            return invalid(format!(
                "classifier.positive_label {} is not a configured label",
                self.classifier.positive_label
            ));
        }
        if self.actuator.baud_rate == 0 {
            return invalid("actuator.baud_rate must be positive".into());
        }
        if self.detection.target_class.is_empty() {
            return invalid("detection.target_class must not be empty".into());
        }
        Ok(())
    }

    pub fn line_config(&self) -> LineConfig {
        LineConfig {
            orientation: self.line.orientation,
            direction: self.line.direction,
            position: self.line.position,
            frame_width: self.frame.width,
            frame_height: self.frame.height,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            crop_capacity: self.tracking.max_buffer_size,
            positive_label: self.classifier.positive_label,
        }
    }
}
