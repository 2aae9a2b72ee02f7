//! Completion channel between a connection's worker and the polling host.
//!
//! The worker pushes finished jobs; the host takes all of them at once when it
//! polls. `drain_all` holds the lock only long enough to swap the queue out, so
//! a poll never waits for a statement to finish.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::QueryJob;
use crate::utils::lock_recovering;

#[derive(Debug, Default)]
pub struct CompletionChannel {
    queue: Mutex<VecDeque<QueryJob>>,
}

impl CompletionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished job. Called by the worker only.
    pub fn push(&self, job: QueryJob) {
        lock_recovering(&self.queue).push_back(job);
    }

    /// Detach every finished job, oldest first, leaving the channel empty.
    pub fn drain_all(&self) -> Vec<QueryJob> {
        let drained = std::mem::take(&mut *lock_recovering(&self.queue));
        Vec::from(drained)
    }

    pub fn len(&self) -> usize {
        lock_recovering(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
