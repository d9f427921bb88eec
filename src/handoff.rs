//! Handoff of finalized verdicts from the decision loop to consumers.

mod consumer;
mod queue;

pub use consumer::QueueConsumer;
pub use queue::{HandoffQueue, QueueItem};
