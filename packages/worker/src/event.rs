//! Event value handed to listeners.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use queue_core::{Job, JobStatus, PopParams, Queue, StopReason, WorkerEventKind};

/// Failure raised by an event listener.
///
/// Listener failures are never isolated: the worker aborts the run at the
/// point of emission and returns the error.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// A single emission of a worker lifecycle event.
///
/// Created fresh for each publish and dropped once every listener ran.
pub struct WorkerEvent<'a> {
    kind: WorkerEventKind,
    worker: &'a [&'static str],
    queue: &'a Arc<dyn Queue>,
    params: &'a PopParams,
    job: Option<&'a dyn Job>,
    job_status: Option<JobStatus>,
    stop_reason: Option<StopReason>,
    runs: u64,
    timestamp: DateTime<Utc>,
    stopped: bool,
}

impl<'a> WorkerEvent<'a> {
    pub fn new(
        kind: WorkerEventKind,
        worker: &'a [&'static str],
        queue: &'a Arc<dyn Queue>,
        params: &'a PopParams,
    ) -> Self {
        Self {
            kind,
            worker,
            queue,
            params,
            job: None,
            job_status: None,
            stop_reason: None,
            runs: 0,
            timestamp: Utc::now(),
            stopped: false,
        }
    }

    pub fn with_job(mut self, job: &'a dyn Job) -> Self {
        self.job = Some(job);
        self
    }

    pub fn with_job_status(mut self, status: JobStatus) -> Self {
        self.job_status = Some(status);
        self
    }

    pub fn with_stop_reason(mut self, reason: StopReason) -> Self {
        self.stop_reason = Some(reason);
        self
    }

    pub fn with_runs(mut self, runs: u64) -> Self {
        self.runs = runs;
        self
    }

    pub fn kind(&self) -> WorkerEventKind {
        self.kind
    }

    /// Identifiers advertised by the emitting worker.
    pub fn worker(&self) -> &[&'static str] {
        self.worker
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        self.queue
    }

    /// Parameters the run forwards to `pop`.
    pub fn params(&self) -> &PopParams {
        self.params
    }

    /// The job being processed; set on job events only.
    pub fn job(&self) -> Option<&dyn Job> {
        self.job
    }

    /// Outcome of the job; set on `ProcessJobPost` only.
    pub fn job_status(&self) -> Option<&JobStatus> {
        self.job_status.as_ref()
    }

    /// Why the run ended; set on `ProcessQueuePost` only.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Jobs completed in the current run so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Skip the remaining listeners for this emission.
    ///
    /// This does not stop the worker loop.
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped
    }

    /// Short description for logging.
    pub fn description(&self) -> String {
        match (self.kind, self.job) {
            (WorkerEventKind::ProcessQueuePre, _) => {
                format!("Queue '{}' processing started", self.queue.name())
            }
            (WorkerEventKind::ProcessQueuePost, _) => {
                let reason = self
                    .stop_reason
                    .map_or_else(|| "unknown".to_string(), |r| r.to_string());
                format!(
                    "Queue '{}' stopped after {} jobs: {}",
                    self.queue.name(),
                    self.runs,
                    reason
                )
            }
            (WorkerEventKind::ProcessJobPre, Some(job)) => {
                format!("Job {} ({}) starting", job.id(), job.name())
            }
            (WorkerEventKind::ProcessJobPost, Some(job)) => {
                let status = self.job_status.as_ref().map_or("unknown", JobStatus::as_str);
                format!("Job {} ({}) finished: {}", job.id(), job.name(), status)
            }
            (kind, None) => format!("{} on queue '{}'", kind, self.queue.name()),
        }
    }
}

impl std::fmt::Debug for WorkerEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerEvent")
            .field("kind", &self.kind)
            .field("worker", &self.worker)
            .field("queue", &self.queue.name())
            .field("job", &self.job.map(|job| job.id()))
            .field("job_status", &self.job_status)
            .field("stop_reason", &self.stop_reason)
            .field("runs", &self.runs)
            .field("stopped", &self.stopped)
            .finish()
    }
}
