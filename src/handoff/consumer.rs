use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::queue::HandoffQueue;

/// Background thread draining a [`HandoffQueue`] into a handler.
///
/// The worker pops with `poll_timeout` so that [`stop`](Self::stop) is noticed
/// even when the queue stays empty.
pub struct QueueConsumer {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl QueueConsumer {
    pub fn spawn<T, F>(queue: Arc<HandoffQueue<T>>, poll_timeout: Duration, mut handler: F) -> Self
    where
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::spawn(move || {
            let mut handled = 0u64;
            while flag.load(Ordering::Acquire) {
                if let Some(item) = queue.pop_timeout(poll_timeout) {
                    handler(item);
                    handled += 1;
                }
            }
            debug!(handled, "queue consumer stopped");
            handled
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the worker and wait for it to exit.
    ///
    /// Returns how many items the worker handled. Items still queued stay in
    /// the queue.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.running.store(false, Ordering::Release);
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for QueueConsumer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
