//! Persistence of crops for later inspection.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use thiserror::Error;

use crate::frame::Crop;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("crop sink I/O on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode crop")]
    Encode(#[from] image::ImageError),
    #[error("crop has {0} channels, expected 3")]
    Channels(usize),
}

/// Why a crop is being saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropKind {
    /// Detection of a class other than the target, always logged
    NonTarget,
    /// "Save all crops" mode
    All,
}

/// Destination for logged crops.
pub trait CropSink: Send {
    fn save(
        &mut self,
        kind: CropKind,
        class_name: &str,
        track_id: u64,
        crop: &Crop,
    ) -> Result<(), SinkError>;

    /// Discard everything saved so far.
    fn clear(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes crops as JPEG files, one directory per track.
///
/// Layout: `<dir>/<class>_<track id>/<unix millis>-<seq>.jpg`.
#[derive(Debug, Clone)]
pub struct DiskCropSink {
    non_target_dir: PathBuf,
    crops_dir: PathBuf,
    seq: u64,
}

impl DiskCropSink {
    pub fn new(non_target_dir: impl Into<PathBuf>, crops_dir: impl Into<PathBuf>) -> Self {
        Self {
            non_target_dir: non_target_dir.into(),
            crops_dir: crops_dir.into(),
            seq: 0,
        }
    }

    fn dir_for(&self, kind: CropKind) -> &Path {
        match kind {
            CropKind::NonTarget => &self.non_target_dir,
            CropKind::All => &self.crops_dir,
        }
    }
}

impl CropSink for DiskCropSink {
    fn save(
        &mut self,
        kind: CropKind,
        class_name: &str,
        track_id: u64,
        crop: &Crop,
    ) -> Result<(), SinkError> {
        let folder = self
            .dir_for(kind)
            .join(format!("{}_{track_id}", folder_component(class_name)));
        fs::create_dir_all(&folder).map_err(|source| SinkError::Io {
            path: folder.clone(),
            source,
        })?;

        self.seq += 1;
        let path = folder.join(format!(
            "{}-{:06}.jpg",
            Utc::now().timestamp_millis(),
            self.seq
        ));
        bgr_to_rgb(crop)?.save_with_format(&path, ImageFormat::Jpeg)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SinkError> {
        for dir in [&self.non_target_dir, &self.crops_dir] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|source| SinkError::Io {
                    path: dir.clone(),
                    source,
                })?;
            }
            fs::create_dir_all(dir).map_err(|source| SinkError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Make a class name safe to use as a single path component.
///
/// Separators, drive colons and control characters become `_`, and `..`
/// cannot survive, so the folder always lands directly under the sink root.
fn folder_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.replace("..", "_");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

fn bgr_to_rgb(crop: &Crop) -> Result<RgbImage, SinkError> {
    let (h, w, c) = crop.dim();
    if c != 3 {
        return Err(SinkError::Channels(c));
    }
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([crop[[y, x, 2]], crop[[y, x, 1]], crop[[y, x, 0]]])
    }))
}

/// Record of one crop handed to a [`MemoryCropSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCrop {
    pub kind: CropKind,
    pub class_name: String,
    pub track_id: u64,
    /// `(height, width, channels)`
    pub shape: (usize, usize, usize),
}

/// Keeps crop records in memory. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryCropSink {
    saved: Arc<Mutex<Vec<SavedCrop>>>,
}

impl MemoryCropSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<SavedCrop> {
        self.saved.lock().clone()
    }

    pub fn count(&self, kind: CropKind) -> usize {
        self.saved.lock().iter().filter(|s| s.kind == kind).count()
    }
}

impl CropSink for MemoryCropSink {
    fn save(
        &mut self,
        kind: CropKind,
        class_name: &str,
        track_id: u64,
        crop: &Crop,
    ) -> Result<(), SinkError> {
        self.saved.lock().push(SavedCrop {
            kind,
            class_name: class_name.to_string(),
            track_id,
            shape: crop.dim(),
        });
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SinkError> {
        self.saved.lock().clear();
        Ok(())
    }
}
