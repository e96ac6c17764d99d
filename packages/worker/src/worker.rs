//! Worker loop that drains a queue one job at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use queue_core::{
    Job, JobError, JobId, JobStatus, PopParams, Queue, QueueError, StopReason, WorkerEventKind,
    WorkerOptions,
};
use serde::Serialize;

use crate::event::{ListenerError, WorkerEvent};
use crate::event_bus::EventBus;
use crate::memory::{MemoryProbe, ProcessMemory};
use crate::registry::{QueueRegistry, RegistryError};
use crate::stop::StopHandle;

/// Identifier advertised by every worker, whatever its processor.
///
/// Subscribe under this to observe all workers; subscribe under
/// [`Worker::identifiers`]`[1]` to observe one worker type only.
pub const WORKER_IDENTIFIER: &str = "queue_worker::Worker";

/// Errors surfaced by [`Worker::process_queue`].
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Failed to build queue '{name}'")]
    QueueFactory {
        name: String,
        #[source]
        source: QueueError,
    },

    #[error("Failed to pop from queue")]
    Queue(#[from] QueueError),

    /// A job failed. A listener that failed while the failure was being
    /// reported is kept in `listener`.
    #[error("Job {job_id} ({job_name}) failed")]
    JobExecution {
        job_id: JobId,
        job_name: String,
        #[source]
        source: JobError,
        listener: Option<Box<WorkerError>>,
    },

    #[error("Listener for {event} failed")]
    Listener {
        event: WorkerEventKind,
        #[source]
        source: ListenerError,
    },
}

impl From<RegistryError> for WorkerError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::QueueNotFound(name) => WorkerError::QueueNotFound(name),
            RegistryError::Factory { name, source } => WorkerError::QueueFactory { name, source },
        }
    }
}

/// How a popped job is run.
///
/// The default [`ExecuteJob`] just calls [`Job::execute`]; backends that need
/// to acknowledge or release jobs plug in their own processor.
pub trait JobProcessor: Send {
    fn process_job(&mut self, job: &mut dyn Job, queue: &Arc<dyn Queue>) -> Result<(), JobError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteJob;

impl JobProcessor for ExecuteJob {
    fn process_job(&mut self, job: &mut dyn Job, _queue: &Arc<dyn Queue>) -> Result<(), JobError> {
        job.execute()
    }
}

/// Result of a run that ended without error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub queue: String,
    /// Jobs executed successfully.
    pub runs: u64,
    pub stop_reason: StopReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProcessSummary {
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

enum DispatchError {
    Job {
        job_id: JobId,
        job_name: String,
        source: JobError,
        /// Set when a `ProcessJobPost` listener failed too.
        listener: Option<WorkerError>,
    },
    Listener(WorkerError),
}

/// Processes jobs from registry queues under [`WorkerOptions`] limits.
///
/// Each run publishes `ProcessQueuePre`, one `ProcessJobPre`/`ProcessJobPost`
/// pair per popped job, and `ProcessQueuePost` on the worker's [`EventBus`].
///
/// A failing job still gets its `ProcessJobPost`, carrying
/// [`JobStatus::Failure`], followed by `ProcessQueuePost` with
/// [`StopReason::JobFailed`]; the job error is then returned. A failing
/// listener or queue aborts the run immediately, with no further events.
///
/// Once a job has failed, [`WorkerError::JobExecution`] is always what gets
/// returned. If a listener fails on either of the two events that follow,
/// the remaining event is skipped and the listener error is attached to the
/// job error as `listener`.
pub struct Worker<P: JobProcessor = ExecuteJob> {
    registry: Arc<QueueRegistry>,
    options: WorkerOptions,
    events: EventBus,
    processor: P,
    memory: Box<dyn MemoryProbe>,
    stop: StopHandle,
    runs: u64,
}

impl Worker<ExecuteJob> {
    pub fn new(registry: Arc<QueueRegistry>, options: WorkerOptions) -> Self {
        Self {
            registry,
            options,
            events: EventBus::new(),
            processor: ExecuteJob,
            memory: Box::new(ProcessMemory::new()),
            stop: StopHandle::new(),
            runs: 0,
        }
    }
}

impl<P: JobProcessor> Worker<P> {
    /// Replace the job processor.
    pub fn with_processor<Q: JobProcessor>(self, processor: Q) -> Worker<Q> {
        Worker {
            registry: self.registry,
            options: self.options,
            events: self.events,
            processor,
            memory: self.memory,
            stop: self.stop,
            runs: self.runs,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_memory_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.memory = Box::new(probe);
        self
    }

    /// Share an existing stop flag, e.g. one wired to a signal handler.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Options are only mutable between runs.
    pub fn options_mut(&mut self) -> &mut WorkerOptions {
        &mut self.options
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn event_bus_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Jobs completed by the current or last run.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Identifiers this worker publishes under: the shared
    /// [`WORKER_IDENTIFIER`] and its concrete type name.
    pub fn identifiers(&self) -> [&'static str; 2] {
        [WORKER_IDENTIFIER, std::any::type_name::<Self>()]
    }

    /// Pop and execute jobs from `queue_name` until the queue is empty, a
    /// limit is reached, or the stop handle is raised.
    ///
    /// `params` are passed to every [`Queue::pop`] call.
    pub fn process_queue(
        &mut self,
        queue_name: &str,
        params: PopParams,
    ) -> Result<ProcessSummary, WorkerError> {
        let queue = self.registry.resolve(queue_name)?;
        let identifiers = self.identifiers();
        let started_at = Utc::now();

        tracing::info!("Processing queue: {}", queue_name);
        self.runs = 0;
        self.publish(
            &identifiers,
            WorkerEvent::new(WorkerEventKind::ProcessQueuePre, &identifiers, &queue, &params),
        )?;

        let stop_reason = loop {
            if let Some(reason) = self.check_limits() {
                break reason;
            }

            let Some(mut job) = queue.pop(&params)? else {
                break StopReason::QueueEmpty;
            };

            match self.dispatch(&identifiers, &queue, &params, job.as_mut()) {
                Ok(()) => self.runs += 1,
                Err(DispatchError::Job {
                    job_id,
                    job_name,
                    source,
                    mut listener,
                }) => {
                    if listener.is_none() {
                        listener = self
                            .publish(
                                &identifiers,
                                WorkerEvent::new(
                                    WorkerEventKind::ProcessQueuePost,
                                    &identifiers,
                                    &queue,
                                    &params,
                                )
                                .with_runs(self.runs)
                                .with_stop_reason(StopReason::JobFailed),
                            )
                            .err();
                    }
                    return Err(WorkerError::JobExecution {
                        job_id,
                        job_name,
                        source,
                        listener: listener.map(Box::new),
                    });
                }
                Err(DispatchError::Listener(err)) => return Err(err),
            }
        };

        self.publish(
            &identifiers,
            WorkerEvent::new(WorkerEventKind::ProcessQueuePost, &identifiers, &queue, &params)
                .with_runs(self.runs)
                .with_stop_reason(stop_reason),
        )?;

        let summary = ProcessSummary {
            queue: queue_name.to_string(),
            runs: self.runs,
            stop_reason,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            queue = queue_name,
            runs = summary.runs,
            duration_ms = summary.duration_ms(),
            "Stopped processing queue: {}",
            stop_reason
        );
        Ok(summary)
    }

    fn check_limits(&mut self) -> Option<StopReason> {
        if self.options.is_max_runs_reached(self.runs) {
            return Some(StopReason::MaxRuns);
        }

        if self.options.max_memory().is_some() {
            match self.memory.current_usage() {
                Ok(bytes) if self.options.is_max_memory_exceeded(bytes) => {
                    tracing::info!("Memory usage {} bytes reached the limit", bytes);
                    return Some(StopReason::MaxMemory);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping memory check: {}", e),
            }
        }

        if self.stop.is_stopped() {
            return Some(StopReason::Interrupted);
        }

        None
    }

    fn dispatch(
        &mut self,
        identifiers: &[&'static str],
        queue: &Arc<dyn Queue>,
        params: &PopParams,
        job: &mut dyn Job,
    ) -> Result<(), DispatchError> {
        let job_id = job.id();

        // Listeners on the pre-job event must see a fully wired job.
        if let Some(aware) = job.as_queue_aware() {
            aware.set_queue(queue.clone());
        }

        self.publish(
            identifiers,
            WorkerEvent::new(WorkerEventKind::ProcessJobPre, identifiers, queue, params)
                .with_job(&*job)
                .with_runs(self.runs),
        )
        .map_err(DispatchError::Listener)?;

        tracing::debug!(job_id = %job_id, job = job.name(), "Executing job");
        let result = self.processor.process_job(job, queue);
        let status = match &result {
            Ok(()) => JobStatus::Success,
            Err(e) => {
                tracing::warn!(job_id = %job_id, "Job {} failed: {}", job.name(), e);
                JobStatus::Failure {
                    error: e.to_string(),
                }
            }
        };

        let post = self.publish(
            identifiers,
            WorkerEvent::new(WorkerEventKind::ProcessJobPost, identifiers, queue, params)
                .with_job(&*job)
                .with_job_status(status)
                .with_runs(self.runs),
        );

        match (result, post) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(err)) => Err(DispatchError::Listener(err)),
            (Err(source), post) => Err(DispatchError::Job {
                job_id,
                job_name: job.name().to_string(),
                source,
                listener: post.err(),
            }),
        }
    }

    fn publish(
        &self,
        identifiers: &[&'static str],
        mut event: WorkerEvent<'_>,
    ) -> Result<(), WorkerError> {
        tracing::trace!("{}", event.description());
        self.events
            .publish(identifiers, &mut event)
            .map_err(|source| WorkerError::Listener {
                event: event.kind(),
                source,
            })
    }
}

impl<P: JobProcessor> std::fmt::Debug for Worker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("identifiers", &self.identifiers())
            .field("options", &self.options)
            .field("events", &self.events)
            .field("runs", &self.runs)
            .finish()
    }
}
