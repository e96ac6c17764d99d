//! Synchronous queue worker.
//!
//! This crate runs the processing loop on top of the `queue_core`
//! capabilities.
//!
//! # Architecture
//!
//! - `QueueRegistry` - Resolves queue names to queue instances
//! - `EventBus` - Ordered listeners for worker lifecycle events
//! - `Worker` - Pops and executes jobs until a limit or an empty queue
//!
//! # Usage
//!
//! ```ignore
//! use queue_worker::{QueueRegistry, Worker};
//!
//! let registry = Arc::new(QueueRegistry::new());
//! registry.register("default", Arc::new(InMemoryQueue::new("default")));
//!
//! let mut worker = Worker::new(registry, WorkerOptions::new().with_max_runs(100)?);
//! let summary = worker.process_queue("default", PopParams::new())?;
//! ```

mod event;
mod event_bus;
mod memory;
pub mod registry;
mod stop;
mod worker;

pub use event::{ListenerError, WorkerEvent};
pub use event_bus::{ANY_IDENTIFIER, EventBus, Listener, ListenerId};
pub use memory::{MemoryProbe, MemoryProbeError, ProcessMemory};
pub use registry::{QueueFactory, QueueRegistry, RegistryError};
pub use stop::StopHandle;
pub use worker::{
    ExecuteJob, JobProcessor, ProcessSummary, WORKER_IDENTIFIER, Worker, WorkerError,
};

/// Re-export core types for convenience.
pub use queue_core::{
    Job, JobError, JobId, JobStatus, PopParams, Queue, QueueAware, QueueError, StopReason,
    WorkerEventKind, WorkerOptions,
};
