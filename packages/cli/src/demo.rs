//! Demo queue seeded with a mix of jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use queue_core::{FnJob, InMemoryQueue, Job, JobError, JobId, Priority, Queue, QueueAware};
use queue_worker::QueueRegistry;

/// Number of demo jobs to seed.
pub const DEMO_JOBS_ENV: &str = "QUEUE_WORKER_DEMO_JOBS";

const DEFAULT_DEMO_JOBS: usize = 10;

pub fn job_count_from_env() -> anyhow::Result<usize> {
    match std::env::var(DEMO_JOBS_ENV) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", DEMO_JOBS_ENV, raw)),
        _ => Ok(DEFAULT_DEMO_JOBS),
    }
}

/// Registry serving a seeded demo queue under `queue_name`.
pub fn registry(queue_name: &str, count: usize) -> QueueRegistry {
    let registry = QueueRegistry::new();
    registry.register(queue_name, Arc::new(seeded_queue(queue_name, count)));
    registry
}

/// Build an in-memory queue holding `count` demo jobs.
///
/// Every tenth job fails so the failure path can be observed.
pub fn seeded_queue(name: &str, count: usize) -> InMemoryQueue {
    let queue = InMemoryQueue::new(name);
    for n in 1..=count {
        match n % 10 {
            0 => queue.push(FnJob::new("fail", |_| Err(JobError::new("Intentional failure")))),
            3 => queue.push_with_priority(ReportJob::new(), Priority::High),
            5 => queue.push(FnJob::new("sleep", |_| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })),
            _ => queue.push(FnJob::new("echo", move |id| {
                tracing::info!("Echo job {}: message #{}", id, n);
                Ok(())
            })),
        }
    }
    queue
}

/// Queue-aware job reporting where it came from.
struct ReportJob {
    id: JobId,
    queue: Option<Arc<dyn Queue>>,
}

impl ReportJob {
    fn new() -> Self {
        Self {
            id: JobId::new(),
            queue: None,
        }
    }
}

impl Job for ReportJob {
    fn id(&self) -> JobId {
        self.id
    }

    fn name(&self) -> &str {
        "report"
    }

    fn execute(&mut self) -> Result<(), JobError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| JobError::new("report job ran without a queue"))?;
        tracing::info!("Report job {} popped from '{}'", self.id, queue.name());
        Ok(())
    }

    fn as_queue_aware(&mut self) -> Option<&mut dyn QueueAware> {
        Some(self)
    }
}

impl QueueAware for ReportJob {
    fn set_queue(&mut self, queue: Arc<dyn Queue>) {
        self.queue = Some(queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::{PopParams, StopReason, WorkerOptions};
    use queue_worker::Worker;

    #[test]
    fn registry_serves_the_requested_name() {
        let registry = registry("reports", 4);
        assert!(registry.contains("reports"));
        assert!(!registry.contains("demo"));
        assert_eq!(registry.resolve("reports").unwrap().name(), "reports");
    }

    #[test]
    fn worker_drains_a_custom_named_demo_queue() {
        let mut worker = Worker::new(Arc::new(registry("nightly", 4)), WorkerOptions::new());
        let summary = worker.process_queue("nightly", PopParams::new()).unwrap();
        assert_eq!(summary.runs, 4);
        assert_eq!(summary.stop_reason, StopReason::QueueEmpty);
    }
}
