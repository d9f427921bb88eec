//! Registry of live track buffers and their expiry.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::frame::Crop;
use crate::fusion::fusion_state::FusionState;
use crate::fusion::track_buffer::{FinalizedTrack, TrackBuffer};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FusionError {
    /// Classification was recorded for an id that has no live buffer.
    #[error("no live track with id {0}")]
    UnknownTrack(u64),
}

/// Configuration for the TrackRegistry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Crops retained per track
    pub crop_capacity: usize,
    /// Classifier label id that counts as positive
    pub positive_label: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            crop_capacity: 100,
            positive_label: 1,
        }
    }
}

/// Owns one [`TrackBuffer`] per track id seen within the timeout.
///
/// Not synchronised: the registry has a single owner, the decision loop.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    buffers: HashMap<u64, TrackBuffer>,
    config: RegistryConfig,
}

impl TrackRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            buffers: HashMap::new(),
            config,
        }
    }

    /// Record an observation of `track_id` at `now`.
    ///
    /// Creates the buffer if the id is not live, appends `crop` to its history
    /// and refreshes its last-seen time.
    pub fn update(&mut self, track_id: u64, crop: Crop, now: f64) -> &mut TrackBuffer {
        let crop_capacity = self.config.crop_capacity;
        let buffer = self.buffers.entry(track_id).or_insert_with(|| {
            debug!(track_id, "new track buffer");
            TrackBuffer::new(track_id, crop_capacity, now)
        });
        buffer.add_crop(crop, now);
        buffer
    }

    /// Fold one classifier label into the track's fused state.
    ///
    /// Unknown ids are rejected with [`FusionError::UnknownTrack`] and leave
    /// the registry unchanged.
    pub fn record_classification(
        &mut self,
        track_id: u64,
        label: u32,
    ) -> Result<FusionState, FusionError> {
        let positive = label == self.config.positive_label;
        let buffer = self
            .buffers
            .get_mut(&track_id)
            .ok_or(FusionError::UnknownTrack(track_id))?;
        buffer.record_classification(positive);
        Ok(buffer.fusion())
    }

    /// Remove and return every buffer not seen for more than `timeout` seconds.
    ///
    /// A buffer updated at `now` is never expired. Negative timeouts behave
    /// like zero. Returned snapshots are ordered by track id.
    pub fn expire(&mut self, timeout: f64, now: f64) -> Vec<FinalizedTrack> {
        let timeout = timeout.max(0.0);
        let mut expired: Vec<u64> = self
            .buffers
            .iter()
            .filter(|(_, buf)| now - buf.last_seen > timeout)
            .map(|(&id, _)| id)
            .collect();
        expired.sort_unstable();

        expired
            .into_iter()
            .filter_map(|id| self.buffers.remove(&id))
            .map(FinalizedTrack::from)
            .collect()
    }

    pub fn get(&self, track_id: u64) -> Option<&TrackBuffer> {
        self.buffers.get(&track_id)
    }

    pub fn get_mut(&mut self, track_id: u64) -> Option<&mut TrackBuffer> {
        self.buffers.get_mut(&track_id)
    }

    pub fn contains(&self, track_id: u64) -> bool {
        self.buffers.contains_key(&track_id)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Iterate over live buffers in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackBuffer> {
        self.buffers.values()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn crop() -> Crop {
        Array3::zeros((4, 4, 3))
    }

    #[test]
    fn test_update_creates_once() {
        let mut registry = TrackRegistry::default();
        registry.update(3, crop(), 0.0);
        registry.update(3, crop(), 0.1);
        registry.update(4, crop(), 0.1);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(3).unwrap().total_frames(), 2);
        assert_eq!(registry.get(3).unwrap().last_seen(), 0.1);
    }

    #[test]
    fn test_record_classification_unknown_id() {
        let mut registry = TrackRegistry::default();
        assert_eq!(
            registry.record_classification(9, 1),
            Err(FusionError::UnknownTrack(9))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_classification_sticky() {
        let mut registry = TrackRegistry::default();
        registry.update(1, crop(), 0.0);

        assert_eq!(
            registry.record_classification(1, 0),
            Ok(FusionState::Negative)
        );
        assert_eq!(
            registry.record_classification(1, 1),
            Ok(FusionState::Positive)
        );
        assert_eq!(
            registry.record_classification(1, 0),
            Ok(FusionState::Positive)
        );

        let buf = registry.get(1).unwrap();
        assert_eq!(buf.positive_frames(), 1);
        assert_eq!(buf.negative_frames(), 2);
    }

    #[test]
    fn test_custom_positive_label() {
        let mut registry = TrackRegistry::new(RegistryConfig {
            crop_capacity: 4,
            positive_label: 0,
        });
        registry.update(1, crop(), 0.0);
        assert_eq!(
            registry.record_classification(1, 0),
            Ok(FusionState::Positive)
        );
    }

    #[test]
    fn test_expire_boundary() {
        let mut registry = TrackRegistry::default();
        registry.update(1, crop(), 0.0);

        assert!(registry.expire(2.0, 1.9).is_empty());
        assert!(registry.expire(2.0, 2.0).is_empty());
        assert!(registry.contains(1));

        let expired = registry.expire(2.0, 2.1);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].track_id(), 1);
        assert!(!registry.contains(1));
    }

    #[test]
    fn test_expire_never_removes_fresh_update() {
        let mut registry = TrackRegistry::default();
        registry.update(1, crop(), 5.0);
        assert!(registry.expire(0.0, 5.0).is_empty());
        assert!(registry.expire(-1.0, 5.0).is_empty());
    }

    #[test]
    fn test_expire_ordered_by_id() {
        let mut registry = TrackRegistry::default();
        for id in [9, 2, 5] {
            registry.update(id, crop(), 0.0);
        }
        registry.update(7, crop(), 3.0);

        let ids: Vec<u64> = registry
            .expire(1.0, 3.0)
            .iter()
            .map(|t| t.track_id())
            .collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reused_id_is_fresh_object() {
        let mut registry = TrackRegistry::default();
        registry.update(1, crop(), 0.0).set_detected_class("orange");
        registry.record_classification(1, 1).unwrap();
        registry.expire(1.0, 2.0);

        let buf = registry.update(1, crop(), 3.0);
        assert!(buf.set_detected_class("apple"));
        assert_eq!(buf.fusion(), FusionState::Unclassified);
        assert_eq!(buf.total_frames(), 1);
    }
}
