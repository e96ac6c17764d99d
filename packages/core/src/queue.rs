//! Queue capability and an in-memory implementation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::Job;

/// Extra parameters forwarded verbatim from `process_queue` to [`Queue::pop`].
pub type PopParams = serde_json::Map<String, serde_json::Value>;

/// Failure raised by a queue backend while popping.
#[derive(Debug, thiserror::Error)]
#[error("queue '{queue}': {message}")]
pub struct QueueError {
    queue: String,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl QueueError {
    pub fn new(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        queue: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue: queue.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Name of the queue that failed.
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// A named source of jobs.
pub trait Queue: Send + Sync {
    /// Name the queue is registered under.
    fn name(&self) -> &str;

    /// Remove and return the next job.
    ///
    /// `Ok(None)` means the queue is currently empty, which ends a worker run
    /// normally.
    fn pop(&self, params: &PopParams) -> Result<Option<Box<dyn Job>>, QueueError>;
}

impl std::fmt::Debug for dyn Queue + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("name", &self.name()).finish()
    }
}

/// Priority level for job execution order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Heap entry ordering jobs by priority, then by insertion order.
struct QueuedJob {
    priority: Priority,
    seq: u64,
    job: Box<dyn Job>,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.priority.cmp(&other.priority) {
            // Older jobs first (lower sequence number)
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

#[derive(Default)]
struct Pending {
    heap: BinaryHeap<QueuedJob>,
    next_seq: u64,
}

/// Process-local queue backed by a priority heap.
///
/// Useful for tests, demos and for feeding a worker from the same process.
/// Pop parameters are ignored.
pub struct InMemoryQueue {
    name: String,
    pending: Mutex<Pending>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Push a job with [`Priority::Normal`].
    pub fn push(&self, job: impl Job + 'static) {
        self.push_boxed(Box::new(job), Priority::default());
    }

    pub fn push_with_priority(&self, job: impl Job + 'static, priority: Priority) {
        self.push_boxed(Box::new(job), priority);
    }

    pub fn push_boxed(&self, job: Box<dyn Job>, priority: Priority) {
        let mut pending = self.lock();
        let seq = pending.next_seq;
        pending.next_seq += 1;
        pending.heap.push(QueuedJob { priority, seq, job });
    }

    /// Number of jobs waiting.
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Drop every pending job.
    pub fn clear(&self) {
        self.lock().heap.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        // A panicking job never runs under this lock, so the heap is intact.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Queue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn pop(&self, _params: &PopParams) -> Result<Option<Box<dyn Job>>, QueueError> {
        Ok(self.lock().heap.pop().map(|queued| queued.job))
    }
}
