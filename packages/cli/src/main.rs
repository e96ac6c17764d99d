use std::sync::Arc;

use anyhow::Context;
use queue_core::{PopParams, WorkerEventKind, WorkerOptions};
use queue_worker::{ANY_IDENTIFIER, EventBus, Worker};
use tracing_subscriber::EnvFilter;

mod demo;

const DEFAULT_QUEUE: &str = "demo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let queue_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_QUEUE.to_string());
    let options = WorkerOptions::from_env().context("Invalid worker configuration")?;
    let demo_jobs = demo::job_count_from_env()?;

    tracing::info!(
        "Starting worker (max_runs: {:?}, max_memory: {:?})",
        options.max_runs(),
        options.max_memory()
    );

    let registry = Arc::new(demo::registry(&queue_name, demo_jobs));
    let mut worker = Worker::new(registry, options);
    log_events(worker.event_bus_mut());

    // Ctrl-C lets the current job finish, then ends the run.
    let stop = worker.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current job");
            stop.stop();
        }
    });

    let summary =
        tokio::task::spawn_blocking(move || worker.process_queue(&queue_name, PopParams::new()))
            .await
            .context("Worker thread panicked")??;

    tracing::info!(
        "Processed {} jobs from '{}' in {}ms ({})",
        summary.runs,
        summary.queue,
        summary.duration_ms(),
        summary.stop_reason
    );
    Ok(())
}

fn log_events(events: &mut EventBus) {
    events.subscribe_all(ANY_IDENTIFIER, i32::MIN, |event| {
        match event.kind() {
            WorkerEventKind::ProcessJobPost
                if event.job_status().is_some_and(|status| !status.is_success()) =>
            {
                tracing::warn!("{}", event.description());
            }
            WorkerEventKind::ProcessJobPre | WorkerEventKind::ProcessJobPost => {
                tracing::debug!("{}", event.description());
            }
            _ => tracing::info!("{}", event.description()),
        }
        Ok(())
    });
}
