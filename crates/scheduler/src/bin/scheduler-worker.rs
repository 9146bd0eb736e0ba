//! scheduler-worker — runs the admission-control scheduler against a
//! queue-backed executor.
//!
//! Loads per-tenant schedule documents, drives the trigger/health/blackout
//! timers, and forwards admitted tasks over the dispatch channel. The
//! worker half here only logs each hand-off; real job bodies live outside
//! this binary.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleet_core::SchedulerConfig;
use fleet_notify::{LogNotifier, Notifier};
use fleet_scheduler::{Executor, QueuedExecutor, SmartScheduler, TenantInfo};

// ── CLI ─────────────────────────────────────────────────────────────

/// Admission-control scheduler worker.
#[derive(Parser, Debug)]
#[command(name = "scheduler-worker", version, about)]
struct Cli {
    /// Comma-separated tenant ids to schedule for.
    #[arg(long, env = "TENANTS", value_delimiter = ',')]
    tenants: Vec<String>,

    /// Simulated job duration in milliseconds for the demo worker loop.
    #[arg(long, env = "JOB_DURATION_MS", default_value_t = 500)]
    job_duration_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fleet_core::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = SchedulerConfig::from_env();
    config.log_summary();

    if cli.tenants.is_empty() {
        warn!("no tenants configured; set --tenants or TENANTS");
    }
    let tenants: Vec<TenantInfo> = cli
        .tenants
        .iter()
        .map(|id| TenantInfo {
            id: id.clone(),
            enabled: true,
            has_credentials: true,
        })
        .collect();

    let (executor, mut task_rx) = QueuedExecutor::new(
        config.queue.clone(),
        config.rotation.clone(),
        config.max_concurrent_global,
        tenants,
    );
    let executor = Arc::new(executor);

    let notifier = Arc::new(LogNotifier);

    // Demo worker loop: consume the dispatch channel, pretend to run each
    // job, and report completion so the next slot frees up.
    let worker_exec = executor.clone();
    let worker_notifier = notifier.clone();
    let job_duration = std::time::Duration::from_millis(cli.job_duration_ms);
    tokio::spawn(async move {
        while let Some(task) = task_rx.recv().await {
            info!(
                tenant = %task.tenant_id,
                job = %task.job_name,
                priority = %task.priority,
                "job started"
            );
            tokio::time::sleep(job_duration).await;
            worker_notifier
                .success(&task.tenant_id, &task.job_name, "job finished")
                .await
                .ok();
            worker_exec.task_completed(&task.tenant_id);
        }
    });

    // Capacity monitor, on its own refresh cadence.
    let monitor_exec = executor.clone();
    let refresh = config.monitor_refresh();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(refresh);
        interval.tick().await;
        loop {
            interval.tick().await;
            let capacity = monitor_exec.capacity_status().await;
            let rotation = monitor_exec.rotation_stats();
            info!(
                running = capacity.running,
                max = capacity.max_concurrent,
                queued = capacity.queued,
                fairness = rotation.fairness.map(|f| f.fairness_score).unwrap_or(100.0),
                "capacity"
            );
        }
    });

    let mut scheduler = SmartScheduler::new(
        config,
        executor.clone() as Arc<dyn Executor>,
        notifier,
    );
    scheduler.initialize().await;

    let status = scheduler.status().await;
    info!(
        schedules = status.total_schedules,
        blackout_active = status.blackout.currently_active,
        "startup status: next {} runs known",
        status.next_runs.len()
    );

    // Ctrl-C flips the shutdown notify; the run loop flushes state and
    // stops the executor before returning.
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown_signal.notify_one();
        }
    });

    scheduler.run(shutdown).await;
    info!("scheduler-worker exited");
    Ok(())
}
