#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use queue_core::{Job, JobError, JobId, PopParams, Queue, QueueAware, QueueError};
use queue_worker::{ANY_IDENTIFIER, EventBus, MemoryProbe, MemoryProbeError, QueueRegistry};
use queue_worker::{Worker, WorkerEventKind, WorkerOptions};

pub const QUEUE_NAME: &str = "foo";

/// Shared counters for jobs handed out by the fake queues.
#[derive(Debug, Default)]
pub struct Calls {
    pub pops: AtomicUsize,
    pub executions: AtomicUsize,
    pub set_queue: AtomicUsize,
    pub received_queue: Mutex<Option<Arc<dyn Queue>>>,
}

impl Calls {
    pub fn pops(&self) -> usize {
        self.pops.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn set_queue(&self) -> usize {
        self.set_queue.load(Ordering::SeqCst)
    }

    pub fn received_queue(&self) -> Option<Arc<dyn Queue>> {
        self.received_queue.lock().unwrap().clone()
    }
}

/// Plain job counting its executions.
pub struct CountingJob {
    id: JobId,
    calls: Arc<Calls>,
    fail: bool,
}

impl CountingJob {
    pub fn new(calls: Arc<Calls>) -> Self {
        Self {
            id: JobId::new(),
            calls,
            fail: false,
        }
    }

    pub fn failing(calls: Arc<Calls>) -> Self {
        Self {
            fail: true,
            ..Self::new(calls)
        }
    }
}

impl Job for CountingJob {
    fn id(&self) -> JobId {
        self.id
    }

    fn name(&self) -> &str {
        "counting"
    }

    fn execute(&mut self) -> Result<(), JobError> {
        self.calls.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(JobError::new("intentional failure"))
        } else {
            Ok(())
        }
    }
}

/// Job recording the queue it receives.
pub struct QueueAwareJob {
    id: JobId,
    calls: Arc<Calls>,
}

impl QueueAwareJob {
    pub fn new(calls: Arc<Calls>) -> Self {
        Self {
            id: JobId::new(),
            calls,
        }
    }
}

impl Job for QueueAwareJob {
    fn id(&self) -> JobId {
        self.id
    }

    fn name(&self) -> &str {
        "queue-aware"
    }

    fn execute(&mut self) -> Result<(), JobError> {
        self.calls.executions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_queue_aware(&mut self) -> Option<&mut dyn QueueAware> {
        Some(self)
    }
}

impl QueueAware for QueueAwareJob {
    fn set_queue(&mut self, queue: Arc<dyn Queue>) {
        self.calls.set_queue.fetch_add(1, Ordering::SeqCst);
        *self.calls.received_queue.lock().unwrap() = Some(queue);
    }
}

type JobBuilder = Box<dyn Fn(&Arc<Calls>) -> Box<dyn Job> + Send + Sync>;

/// Queue handing out a fixed number of jobs (or endless ones).
pub struct FakeQueue {
    name: String,
    remaining: Option<AtomicUsize>,
    build: JobBuilder,
    pub calls: Arc<Calls>,
    pub last_params: Mutex<Option<PopParams>>,
    fail_pop: bool,
}

impl FakeQueue {
    /// Queue that never runs dry.
    pub fn endless() -> Self {
        Self::build(None, |calls| Box::new(CountingJob::new(calls.clone())))
    }

    /// Queue holding `count` plain jobs.
    pub fn with_jobs(count: usize) -> Self {
        Self::build(Some(count), |calls| Box::new(CountingJob::new(calls.clone())))
    }

    pub fn empty() -> Self {
        Self::with_jobs(0)
    }

    pub fn with_failing_jobs(count: usize) -> Self {
        Self::build(Some(count), |calls| Box::new(CountingJob::failing(calls.clone())))
    }

    pub fn with_queue_aware_jobs(count: usize) -> Self {
        Self::build(Some(count), |calls| Box::new(QueueAwareJob::new(calls.clone())))
    }

    /// Queue whose backend fails on every pop.
    pub fn broken() -> Self {
        Self {
            fail_pop: true,
            ..Self::empty()
        }
    }

    fn build<F>(count: Option<usize>, build: F) -> Self
    where
        F: Fn(&Arc<Calls>) -> Box<dyn Job> + Send + Sync + 'static,
    {
        Self {
            name: QUEUE_NAME.to_string(),
            remaining: count.map(AtomicUsize::new),
            build: Box::new(build),
            calls: Arc::new(Calls::default()),
            last_params: Mutex::new(None),
            fail_pop: false,
        }
    }
}

impl Queue for FakeQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn pop(&self, params: &PopParams) -> Result<Option<Box<dyn Job>>, QueueError> {
        self.calls.pops.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(params.clone());
        if self.fail_pop {
            return Err(QueueError::new(&self.name, "backend unavailable"));
        }
        if let Some(remaining) = &self.remaining {
            let taken =
                remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if taken.is_err() {
                return Ok(None);
            }
        }
        Ok(Some((self.build)(&self.calls)))
    }
}

/// Memory probe reporting a fixed value.
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn current_usage(&mut self) -> Result<u64, MemoryProbeError> {
        Ok(self.0)
    }
}

/// Event kinds seen by a listener, in order.
pub type EventLog = Arc<Mutex<Vec<WorkerEventKind>>>;

/// Record every event the worker publishes.
pub fn record_events(events: &mut EventBus) -> EventLog {
    let log = EventLog::default();
    let sink = log.clone();
    events.subscribe_all(ANY_IDENTIFIER, 0, move |event| {
        sink.lock().unwrap().push(event.kind());
        Ok(())
    });
    log
}

/// Registry with `queue` under [`QUEUE_NAME`] and a worker on top of it.
pub fn worker_for(queue: Arc<FakeQueue>, options: WorkerOptions) -> Worker {
    let registry = Arc::new(QueueRegistry::new());
    registry.register(QUEUE_NAME, queue);
    Worker::new(registry, options).with_memory_probe(FixedMemory(0))
}

/// Options from the reference setup: one run, 1 GiB memory ceiling.
pub fn default_options() -> WorkerOptions {
    let mut options = WorkerOptions::new();
    options.set_max_runs(1).unwrap();
    options.set_max_memory(1024 * 1024 * 1024).unwrap();
    options
}
