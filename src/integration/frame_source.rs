//! Paced frame acquisition on a background thread.
//!
//! The worker keeps only the most recent frame. Readers get that frame or
//! nothing, never a partially written one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::Frame;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device error: {0}")]
    Device(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("capture already released")]
    Released,
    #[error("failed to spawn capture thread")]
    Spawn(#[source] std::io::Error),
}

/// Underlying camera or video file.
pub trait Capture: Send + 'static {
    /// Grab the next frame; `Ok(None)` at end of stream.
    fn grab(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Seek back to the first frame. Only file-backed sources can.
    fn rewind(&mut self) -> bool {
        false
    }

    /// Native frame rate, if the source reports one.
    fn fps(&self) -> Option<f64> {
        None
    }
}

/// Anything the decision loop can pull frames from.
pub trait FrameSource {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Latest frame, or `None` if there is none yet or the source ended.
    fn read(&self) -> Option<Frame>;

    fn stop(&mut self);
}

/// Single-slot cell holding the newest frame.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Frame>>,
    stored: AtomicU64,
}

impl LatestFrame {
    pub fn store(&self, frame: Frame) {
        *self.slot.lock() = Some(frame);
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    pub fn load(&self) -> Option<Frame> {
        self.slot.lock().clone()
    }

    /// Frames stored since creation.
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }
}

/// [`FrameSource`] running a [`Capture`] on its own thread.
pub struct ThreadedFrameSource<C: Capture> {
    capture: Option<C>,
    latest: Arc<LatestFrame>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<C>>,
    frame_delay: Duration,
}

impl<C: Capture> ThreadedFrameSource<C> {
    /// Wrap `capture`, pacing at its native rate or `fallback_fps` when the
    /// reported rate is missing or implausible.
    pub fn new(capture: C, fallback_fps: f64) -> Self {
        let fps = capture
            .fps()
            .filter(|fps| *fps > 0.0 && *fps <= 1000.0)
            .unwrap_or(fallback_fps)
            .max(1.0);
        Self {
            capture: Some(capture),
            latest: Arc::new(LatestFrame::default()),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            frame_delay: Duration::from_secs_f64(1.0 / fps),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    /// Shared handle to the frame slot.
    pub fn latest(&self) -> Arc<LatestFrame> {
        Arc::clone(&self.latest)
    }
}

impl<C: Capture> FrameSource for ThreadedFrameSource<C> {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.handle.is_some() {
            return Ok(());
        }
        let mut capture = self.capture.take().ok_or(CaptureError::Released)?;

        let latest = Arc::clone(&self.latest);
        let running = Arc::clone(&self.running);
        let frame_delay = self.frame_delay;
        running.store(true, Ordering::Release);

        let handle = thread::Builder::new()
            .name("frame-capture".into())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    let started = Instant::now();
                    match capture.grab() {
                        Ok(Some(frame)) => latest.store(frame),
                        Ok(None) => {
                            if capture.rewind() {
                                debug!("end of stream, looping");
                                continue;
                            }
                            debug!("end of stream");
                            latest.clear();
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "capture failed, stopping");
                            latest.clear();
                            break;
                        }
                    }
                    if let Some(rest) = frame_delay.checked_sub(started.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                running.store(false, Ordering::Release);
                capture
            })
            .map_err(|err| {
                self.running.store(false, Ordering::Release);
                CaptureError::Spawn(err)
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    fn read(&self) -> Option<Frame> {
        self.latest.load()
    }

    /// Stop the worker, wait for it, then release the capture.
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                // Released only after the worker is gone.
                Ok(capture) => drop(capture),
                Err(_) => warn!("capture thread panicked"),
            }
        }
        self.capture = None;
        self.latest.clear();
    }
}

impl<C: Capture> Drop for ThreadedFrameSource<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::blank_frame;
    use std::sync::atomic::AtomicUsize;

    struct CountingCapture {
        remaining: usize,
        total: usize,
        looping: bool,
        released: Arc<AtomicUsize>,
    }

    impl Capture for CountingCapture {
        fn grab(&mut self) -> Result<Option<Frame>, CaptureError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(blank_frame(4, 2)))
        }

        fn rewind(&mut self) -> bool {
            if self.looping {
                self.remaining = self.total;
            }
            self.looping
        }

        fn fps(&self) -> Option<f64> {
            Some(500.0)
        }
    }

    impl Drop for CountingCapture {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_read_before_start_is_empty() {
        let released = Arc::new(AtomicUsize::new(0));
        let source = ThreadedFrameSource::new(
            CountingCapture {
                remaining: 3,
                total: 3,
                looping: false,
                released,
            },
            30.0,
        );
        assert!(source.read().is_none());
        assert_eq!(source.frame_delay(), Duration::from_millis(2));
    }

    #[test]
    fn test_looping_source_keeps_running() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut source = ThreadedFrameSource::new(
            CountingCapture {
                remaining: 2,
                total: 2,
                looping: true,
                released: Arc::clone(&released),
            },
            30.0,
        );
        source.start().unwrap();
        source.start().unwrap();

        let latest = source.latest();
        assert!(wait_until(|| latest.stored() > 6));
        assert!(source.is_running());
        assert_eq!(source.read().unwrap().dim(), (2, 4, 3));

        source.stop();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(source.read().is_none());
        assert!(matches!(source.start(), Err(CaptureError::Released)));
    }

    #[test]
    fn test_finite_source_ends_empty() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut source = ThreadedFrameSource::new(
            CountingCapture {
                remaining: 3,
                total: 3,
                looping: false,
                released: Arc::clone(&released),
            },
            30.0,
        );
        source.start().unwrap();

        let latest = source.latest();
        assert!(wait_until(|| latest.stored() == 3 && !source.is_running()));
        assert!(source.read().is_none());

        source.stop();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
