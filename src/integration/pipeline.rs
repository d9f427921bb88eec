//! DecisionPipeline: one pass of tracking fusion per frame.

use std::sync::Arc;

use nalgebra::Point2;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{ClassifierConfig, ConfigError, PipelineConfig, Toggles};
use crate::counting::{CountingLine, LineError, Tallies};
use crate::frame::{Crop, Frame, crop_frame, frame_size};
use crate::fusion::{Category, FinalizedTrack, TrackRegistry};
use crate::handoff::{HandoffQueue, QueueItem};

use super::actuator::{ActuatorLink, Connector};
use super::crop_sink::{CropKind, CropSink, DiskCropSink, SinkError};
use super::detector::{CropClassifier, TrackSource, TrackedFrame};
use super::frame_source::FrameSource;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Line(#[from] LineError),
}

/// A track credited by the counting line during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Crossing {
    pub track_id: u64,
    pub category: Category,
}

/// Terminal verdict of a finalized track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub track_id: u64,
    pub category: Category,
    pub detected_class: String,
    pub total_frames: u64,
    pub positive_frames: u64,
    pub negative_frames: u64,
    /// Whether the line counted this track before it expired
    pub counted: bool,
    /// Whether the handoff queue accepted the item
    pub queued: bool,
}

impl Verdict {
    fn new(track: &FinalizedTrack, category: Category, queued: bool) -> Self {
        Self {
            track_id: track.track_id(),
            category,
            detected_class: track.detected_class().to_string(),
            total_frames: track.total_frames(),
            positive_frames: track.positive_frames(),
            negative_frames: track.negative_frames(),
            counted: track.was_counted(),
            queued,
        }
    }
}

/// What happened during one [`DecisionPipeline::tick`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub now: f64,
    /// Detection was disabled, nothing ran
    pub skipped: bool,
    /// Detections that produced a non-empty crop
    pub detections: usize,
    /// Non-target crops the sink accepted
    pub non_target_crops: usize,
    pub crossings: Vec<Crossing>,
    pub verdicts: Vec<Verdict>,
}

/// Orchestrates tracker output, crop classification, line counting and
/// finalization.
///
/// Owns the [`TrackRegistry`] and [`CountingLine`]; only the
/// [`HandoffQueue`] is shared with other threads.
pub struct DecisionPipeline<T: TrackSource, C: CropClassifier> {
    tracker: T,
    classifier: C,
    registry: TrackRegistry,
    line: CountingLine,
    queue: Arc<HandoffQueue<QueueItem>>,
    clock: Box<dyn Clock>,
    crop_sink: Box<dyn CropSink>,
    actuator: Option<ActuatorLink<Box<dyn Connector>>>,
    toggles: Toggles,
    target_class: String,
    track_timeout: f64,
    classifier_config: ClassifierConfig,
}

impl<T: TrackSource, C: CropClassifier> DecisionPipeline<T, C> {
    /// Build a pipeline from a validated configuration.
    ///
    /// Uses the system clock, writes crops to the configured directories and
    /// has no actuator until one is attached.
    pub fn new(config: &PipelineConfig, tracker: T, classifier: C) -> Result<Self, PipelineError> {
        config.validate()?;
        let line = CountingLine::new(config.line_config())?;

        Ok(Self {
            tracker,
            classifier,
            registry: TrackRegistry::new(config.registry_config()),
            line,
            queue: Arc::new(HandoffQueue::new(config.queue.max_size)),
            clock: Box::new(SystemClock),
            crop_sink: Box::new(DiskCropSink::new(
                &config.crop_log.non_target_dir,
                &config.crop_log.crops_dir,
            )),
            actuator: None,
            toggles: config.toggles,
            target_class: config.detection.target_class.clone(),
            track_timeout: config.tracking.track_timeout,
            classifier_config: config.classifier.clone(),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_crop_sink(mut self, sink: impl CropSink + 'static) -> Self {
        self.crop_sink = Box::new(sink);
        self
    }

    /// Share an existing queue instead of the one built from the config.
    pub fn with_queue(mut self, queue: Arc<HandoffQueue<QueueItem>>) -> Self {
        self.queue = queue;
        self
    }

    /// Open an actuator link; a failed connect leaves it disconnected.
    pub fn with_actuator(mut self, connector: impl Connector + 'static) -> Self {
        let connector: Box<dyn Connector> = Box::new(connector);
        self.actuator = Some(ActuatorLink::open(connector));
        self
    }

    /// Run one pass over `frame`.
    ///
    /// Collaborator failures are logged and never abort the pass. When
    /// detection is disabled the pass does nothing, expiry included.
    pub fn tick(&mut self, frame: &Frame) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport {
            now,
            ..TickReport::default()
        };
        if !self.toggles.detection_enabled {
            report.skipped = true;
            return report;
        }

        match self.tracker.track(frame) {
            Ok(Some(tracked)) if tracked.is_untracked() => {
                debug!("detections without track ids, nothing to process");
            }
            Ok(Some(tracked)) => self.process_detections(frame, &tracked, now, &mut report),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "tracker failed, no detections this tick"),
        }

        self.finalize_expired(now, &mut report);
        report
    }

    /// Tick on the latest frame of `source`, if it has one.
    pub fn poll(&mut self, source: &impl FrameSource) -> Option<TickReport> {
        let frame = source.read()?;
        Some(self.tick(&frame))
    }

    fn process_detections(
        &mut self,
        frame: &Frame,
        tracked: &TrackedFrame,
        now: f64,
        report: &mut TickReport,
    ) {
        let (width, height) = frame_size(frame);
        let mut observed: Vec<(u64, Point2<f32>)> = Vec::with_capacity(tracked.detections.len());
        let mut pending: Vec<(u64, Crop)> = Vec::new();

        for det in &tracked.detections {
            let Some(track_id) = det.track_id else {
                continue;
            };
            let Some(region) = det.bbox.clip(width, height) else {
                debug!(track_id, "empty crop after clipping, detection skipped");
                continue;
            };
            let crop = crop_frame(frame, &region);
            report.detections += 1;

            let buffer = self.registry.update(track_id, crop.clone(), now);
            buffer.set_detected_class(tracked.class_name(det.class_id));
            let class_name = buffer.detected_class().to_string();
            let is_target = class_name == self.target_class;

            // Non-target crops are logged whatever the toggles say.
            if !is_target && self.save_crop(CropKind::NonTarget, &class_name, track_id, &crop) {
                report.non_target_crops += 1;
            }
            if self.toggles.save_all_crops {
                self.save_crop(CropKind::All, &class_name, track_id, &crop);
            }
            if is_target && self.toggles.classification_enabled {
                pending.push((track_id, crop));
            }
            observed.push((track_id, region.centroid()));
        }

        self.classify(&pending);

        for (track_id, centroid) in observed {
            let Some(buffer) = self.registry.get_mut(track_id) else {
                continue;
            };
            let previous = buffer.replace_centroid(centroid);
            if self.line.check_crossing(track_id, centroid, previous) {
                let category = buffer.category(&self.target_class);
                buffer.mark_finalized();
                self.line.increment_category(category);
                report.crossings.push(Crossing { track_id, category });
            }
        }
    }

    /// Hand a crop to the sink. Failures are logged, never fatal.
    fn save_crop(
        &mut self,
        kind: CropKind,
        class_name: &str,
        track_id: u64,
        crop: &Crop,
    ) -> bool {
        match self.crop_sink.save(kind, class_name, track_id, crop) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, track_id, ?kind, "failed to save crop");
                false
            }
        }
    }

    /// Classify pending crops in batches and fold the labels into their tracks.
    fn classify(&mut self, pending: &[(u64, Crop)]) {
        let batch_size = self.classifier_config.batch_size.max(1);
        for chunk in pending.chunks(batch_size) {
            let crops: Vec<&Crop> = chunk.iter().map(|(_, crop)| crop).collect();
            let results = match self.classifier.classify_batch(&crops) {
                Ok(results) => results,
                Err(err) => {
                    warn!(error = %err, batch = chunk.len(), "classifier failed, fused state kept");
                    continue;
                }
            };
            if results.is_empty() {
                // A classifier with no model answers nothing; fusion stays put.
                debug!(batch = chunk.len(), "classifier returned no labels");
                continue;
            }
            if results.len() != chunk.len() {
                warn!(
                    expected = chunk.len(),
                    got = results.len(),
                    "classifier result count mismatch"
                );
            }

            for ((track_id, _), result) in chunk.iter().zip(results) {
                match self.registry.record_classification(*track_id, result.label_id) {
                    Ok(fusion) => debug!(
                        track_id = *track_id,
                        label = self
                            .classifier_config
                            .label_name(result.label_id)
                            .unwrap_or("unknown"),
                        confidence = result.confidence,
                        ?fusion,
                        "crop classified"
                    ),
                    Err(err) => warn!(error = %err, "classification dropped"),
                }
            }
        }
    }

    fn finalize_expired(&mut self, now: f64, report: &mut TickReport) {
        for track in self.registry.expire(self.track_timeout, now) {
            let category = track.category(&self.target_class);
            let queued = self
                .queue
                .push(QueueItem::new(track.track_id(), category, now));

            if let Some(link) = self.actuator.as_mut() {
                if let Err(err) = link.send_verdict(category) {
                    warn!(error = %err, track_id = track.track_id(), "verdict not delivered");
                }
            }

            info!(
                track_id = track.track_id(),
                class = track.detected_class(),
                verdict = %category,
                token = %char::from(category.token()),
                frames = track.total_frames(),
                positive = track.positive_frames(),
                negative = track.negative_frames(),
                counted = track.was_counted(),
                queued,
                "track finalized"
            );
            report.verdicts.push(Verdict::new(&track, category, queued));
        }
    }

    /// Snapshot of the line tallies.
    pub fn counts(&self) -> Tallies {
        self.line.counts()
    }

    /// Zero the tallies and forget counted ids.
    pub fn reset_counts(&mut self) {
        self.line.reset();
    }

    pub fn set_line_position(&mut self, fraction: f64) -> Result<(), LineError> {
        self.line.set_line_position(fraction)
    }

    /// Remove every crop written so far.
    pub fn clear_logs(&mut self) -> Result<(), SinkError> {
        self.crop_sink.clear()
    }

    pub fn toggles(&self) -> Toggles {
        self.toggles
    }

    pub fn set_detection_enabled(&mut self, enabled: bool) {
        self.toggles.detection_enabled = enabled;
    }

    pub fn set_classification_enabled(&mut self, enabled: bool) {
        self.toggles.classification_enabled = enabled;
    }

    pub fn set_save_all_crops(&mut self, enabled: bool) {
        self.toggles.save_all_crops = enabled;
    }

    /// Handle to the handoff queue for consumers.
    pub fn queue(&self) -> Arc<HandoffQueue<QueueItem>> {
        Arc::clone(&self.queue)
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn line(&self) -> &CountingLine {
        &self.line
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    pub fn track_timeout(&self) -> f64 {
        self.track_timeout
    }

    pub fn actuator_mut(&mut self) -> Option<&mut ActuatorLink<Box<dyn Connector>>> {
        self.actuator.as_mut()
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }
}
