//! Worker lifecycle event kinds and the outcomes they carry.

use serde::{Deserialize, Serialize};

/// Lifecycle points at which a worker publishes an event.
///
/// The order of a run is always `ProcessQueuePre`, then zero or more
/// `ProcessJobPre`/`ProcessJobPost` pairs, then `ProcessQueuePost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerEventKind {
    #[serde(rename = "processQueue.pre")]
    ProcessQueuePre,
    #[serde(rename = "processQueue.post")]
    ProcessQueuePost,
    #[serde(rename = "processJob.pre")]
    ProcessJobPre,
    #[serde(rename = "processJob.post")]
    ProcessJobPost,
}

impl WorkerEventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [WorkerEventKind; 4] = [
        WorkerEventKind::ProcessQueuePre,
        WorkerEventKind::ProcessJobPre,
        WorkerEventKind::ProcessJobPost,
        WorkerEventKind::ProcessQueuePost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerEventKind::ProcessQueuePre => "processQueue.pre",
            WorkerEventKind::ProcessQueuePost => "processQueue.post",
            WorkerEventKind::ProcessJobPre => "processJob.pre",
            WorkerEventKind::ProcessJobPost => "processJob.post",
        }
    }

    /// Whether the event concerns a single job rather than the whole run.
    pub fn is_job_event(&self) -> bool {
        matches!(
            self,
            WorkerEventKind::ProcessJobPre | WorkerEventKind::ProcessJobPost
        )
    }
}

impl std::fmt::Display for WorkerEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a job, attached to `ProcessJobPost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failure { error: String },
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failure { .. } => "failure",
        }
    }
}

/// Why a run ended, attached to `ProcessQueuePost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The queue had no job to hand out.
    QueueEmpty,
    /// The configured run limit was reached.
    MaxRuns,
    /// Process memory reached the configured ceiling.
    MaxMemory,
    /// The worker was asked to stop from outside the loop.
    Interrupted,
    /// A job failed; the error is returned to the caller.
    JobFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::QueueEmpty => write!(f, "queue empty"),
            StopReason::MaxRuns => write!(f, "max runs reached"),
            StopReason::MaxMemory => write!(f, "max memory exceeded"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::JobFailed => write!(f, "job failed"),
        }
    }
}
