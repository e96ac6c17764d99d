//! Core capabilities for the queue worker.
//!
//! This crate holds the types shared by queue backends, jobs and workers:
//! - `Job` and `QueueAware` for units of work
//! - `Queue` for named job sources, plus `InMemoryQueue`
//! - `WorkerOptions` for run limits
//! - Event kinds and outcomes published by a worker

mod events;
mod job;
mod options;
mod queue;

pub use events::{JobStatus, StopReason, WorkerEventKind};
pub use job::{FnJob, Job, JobError, JobId, QueueAware};
pub use options::{MAX_MEMORY_ENV, MAX_RUNS_ENV, OptionsError, WorkerOptions};
pub use queue::{InMemoryQueue, PopParams, Priority, Queue, QueueError};
