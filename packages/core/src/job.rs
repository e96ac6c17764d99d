//! Job capability: units of work handed to a worker by a queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::Queue;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure reported by [`Job::execute`].
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct JobError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it reachable through `source()`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A unit of work popped from a [`Queue`].
///
/// The worker owns a job for exactly one iteration: it is dropped once
/// the post-job event has been published.
pub trait Job: Send {
    /// Identifier used in logs and events.
    fn id(&self) -> JobId;

    /// Job-type label for logs.
    fn name(&self) -> &str {
        "job"
    }

    /// Run the job.
    fn execute(&mut self) -> Result<(), JobError>;

    /// Capability query for [`QueueAware`] jobs.
    ///
    /// Jobs that want the queue they were popped from override this to
    /// return `Some(self)`.
    fn as_queue_aware(&mut self) -> Option<&mut dyn QueueAware> {
        None
    }
}

/// Capability for jobs that need a handle on their originating queue,
/// e.g. to push follow-up work.
pub trait QueueAware {
    fn set_queue(&mut self, queue: Arc<dyn Queue>);
}

/// A closure-backed job.
pub struct FnJob<F>
where
    F: FnMut(JobId) -> Result<(), JobError> + Send + 'static,
{
    id: JobId,
    name: String,
    handler: F,
}

impl<F> FnJob<F>
where
    F: FnMut(JobId) -> Result<(), JobError> + Send + 'static,
{
    /// Create a new function-based job.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            handler,
        }
    }
}

impl<F> Job for FnJob<F>
where
    F: FnMut(JobId) -> Result<(), JobError> + Send + 'static,
{
    fn id(&self) -> JobId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> Result<(), JobError> {
        (self.handler)(self.id)
    }
}

impl std::fmt::Debug for dyn Job + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}
