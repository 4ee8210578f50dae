//! Defines the events a `JobQueue` emits and the listener signature.

use std::sync::Arc;

use super::queue::{Job, JobQueue};

/// Lifecycle notifications emitted by a [`JobQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEvent {
    /// A job was enqueued.
    Added,
    /// A job settled, successfully or not.
    Finished,
    /// A job settled and nothing is left in the queue.
    Done,
}

/// A queue hook.
///
/// Listeners run synchronously, in registration order, on whichever task
/// triggered the event. Identity is the `Arc` pointer: registering the same
/// listener twice has no effect.
pub type Listener = Arc<dyn Fn(&JobQueue, &Arc<Job>) + Send + Sync>;
