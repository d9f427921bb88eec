//! Bounded FIFO shared between the decision loop and downstream consumers.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::trace;

use crate::fusion::Category;

/// Verdict handed downstream once per finalized object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub track_id: u64,
    pub category: Category,
    /// Creation time in seconds
    pub created_at: f64,
}

impl QueueItem {
    pub fn new(track_id: u64, category: Category, created_at: f64) -> Self {
        Self {
            track_id,
            category,
            created_at,
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    dropped: u64,
}

/// Thread-safe bounded queue that drops new items when full.
///
/// Every operation, including [`snapshot`](Self::snapshot) and
/// [`size`](Self::size), runs under the same lock, so no caller ever sees a
/// partially applied push or pop.
pub struct HandoffQueue<T = QueueItem> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> HandoffQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity.min(1024)),
                dropped: 0,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Append `item` without blocking.
    ///
    /// Returns `false` if the queue was full and the item was discarded.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        if state.items.len() >= self.capacity {
            state.dropped += 1;
            trace!(capacity = self.capacity, "handoff queue full, item dropped");
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Remove the head of the queue.
    ///
    /// With `block == false` this returns immediately. Otherwise it waits for
    /// an item, forever if `timeout` is `None`, or until `timeout` has elapsed.
    pub fn pop(&self, block: bool, timeout: Option<Duration>) -> Option<T> {
        let mut state = self.state.lock();
        if !block {
            return state.items.pop_front();
        }

        match timeout {
            None => {
                while state.items.is_empty() {
                    self.not_empty.wait(&mut state);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while state.items.is_empty() {
                    if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        state.items.pop_front()
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        self.pop(false, None)
    }

    /// Blocking pop that gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.pop(true, Some(timeout))
    }

    pub fn size(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Remove every queued item.
    pub fn clear(&self) {
        self.state.lock().items.clear();
    }
}

impl<T: Clone> HandoffQueue<T> {
    /// Copy of the head without removing it.
    pub fn peek(&self) -> Option<T> {
        self.state.lock().items.front().cloned()
    }

    /// Point-in-time copy of the queue, head first.
    pub fn snapshot(&self) -> Vec<T> {
        self.state.lock().items.iter().cloned().collect()
    }
}

impl<T> std::fmt::Debug for HandoffQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffQueue")
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .finish()
    }
}
