//! Recurring-trigger scheduler with admission control.
//!
//! Owns one trigger per (tenant, job) pair and fires them from a tick loop:
//! each tick fires every entry with a cron occurrence inside the elapsed
//! window, so an occurrence fires exactly once and occurrences missed while
//! the process was down are not replayed. Every firing runs the admission
//! pipeline (pause → blackout window → rate limit → minimum interval →
//! executor capacity); triggers suppressed by the blackout window are
//! cancelled outright when the window ends — never deferred or caught up.
//!
//! All state lives behind one `&mut self`; the run loop drives every timer
//! from a single task, so no two ticks ever touch the state concurrently.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use fleet_core::{job_key, Priority, SchedulerConfig, SubmitFlags, TaskRequest};
use fleet_notify::Notifier;

use crate::blackout::BlackoutWindow;
use crate::error::{AdmissionDecision, RejectReason, SchedulerError};
use crate::executor::Executor;
use crate::rate_limit::{LimitExceeded, RateLimitTracker};
use crate::schedule::{load_schedules, JobIntervals, ScheduleEntry};
use crate::status::{BlackoutStatus, SchedulerStatus, UpcomingRun};

/// How often trigger due-ness is evaluated.
const TRIGGER_TICK_SECS: u64 = 30;
/// Blackout edge detection cadence.
const BLACKOUT_EDGE_SECS: u64 = 60;
/// Rate-limit persistence cadence.
const RATE_LIMIT_FLUSH_SECS: u64 = 600;
const RATE_LIMIT_FILE: &str = "rate_limits.json";

pub struct SmartScheduler {
    config: SchedulerConfig,
    blackout: BlackoutWindow,
    intervals: JobIntervals,
    entries: Vec<ScheduleEntry>,
    /// Paused `tenant_job` keys (a per-tenant pause inserts every job key).
    paused: HashSet<String>,
    /// Keys whose trigger was suppressed by the blackout window, kept only
    /// for cancellation bookkeeping at the window's end.
    missed: HashMap<String, DateTime<Utc>>,
    /// Last overdue alert per key, for alert throttling.
    overdue_alerts: HashMap<String, DateTime<Utc>>,
    was_blackout: bool,
    rate_limits: RateLimitTracker,
    executor: Arc<dyn Executor>,
    notifier: Arc<dyn Notifier>,
}

impl SmartScheduler {
    pub fn new(
        config: SchedulerConfig,
        executor: Arc<dyn Executor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let blackout = BlackoutWindow::from_config(&config.blackout);
        let rate_limits = RateLimitTracker::new(config.rate_limits.clone());
        Self {
            config,
            blackout,
            intervals: JobIntervals::default(),
            entries: Vec::new(),
            paused: HashSet::new(),
            missed: HashMap::new(),
            overdue_alerts: HashMap::new(),
            was_blackout: false,
            rate_limits,
            executor,
            notifier,
        }
    }

    /// Replace the per-job interval table.
    pub fn with_intervals(mut self, intervals: JobIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Load schedules and persisted rate-limit state, then validate
    /// credentials through the executor.
    pub async fn initialize(&mut self) {
        let now = Utc::now();
        info!("initializing scheduler");

        self.rate_limits = RateLimitTracker::load(
            &self.rate_limit_path(),
            self.config.rate_limits.clone(),
            now,
        );

        let tenants = self.executor.list_tenants().await;
        let (entries, failures) =
            load_schedules(&self.config.schedules_dir, &tenants, &self.blackout);
        self.entries = entries;
        for failure in &failures {
            warn!(error = %failure, "trigger registration failed");
            self.alert(&failure.to_string()).await;
        }

        let summary = self.executor.validate_all_credentials().await;
        info!(
            valid = summary.valid,
            total = summary.total,
            "credential validation complete"
        );
        if summary.expired + summary.unknown > 0 {
            for tenant in tenants.iter().filter(|t| t.enabled && t.has_credentials) {
                self.executor.refresh_credentials(&tenant.id).await;
            }
        }

        self.was_blackout = self.blackout.is_active_at(now);
        info!(
            schedules = self.entries.len(),
            blackout_active = self.was_blackout,
            "scheduler initialized"
        );
        self.alert(&format!(
            "Initialized: {} tasks, credentials {}/{}, blackout {}",
            self.entries.len(),
            summary.valid,
            summary.total,
            if self.was_blackout { "active" } else { "inactive" },
        ))
        .await;
    }

    // ── Trigger firing ──────────────────────────────────────────────

    /// Fire every entry with a cron occurrence in `(after, now]`.
    pub async fn trigger_tick(&mut self, after: DateTime<Utc>, now: DateTime<Utc>) {
        let due: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due_between(after, now))
            .map(|(i, _)| i)
            .collect();
        for idx in due {
            self.handle_trigger(idx, now, false).await;
        }
    }

    /// One trigger firing: admission pipeline, then submission and
    /// bookkeeping. `force` bypasses admission (overdue recovery).
    async fn handle_trigger(&mut self, idx: usize, now: DateTime<Utc>, force: bool) {
        let key = self.entries[idx].job_key();
        if self.paused.contains(&key) {
            debug!(key = %key, "skipped (paused)");
            return;
        }

        if force {
            info!(key = %key, "force executing (overdue recovery)");
        } else {
            match self.pre_execution_checks(idx, now).await {
                AdmissionDecision::Allowed => {}
                AdmissionDecision::Denied(reason) => {
                    info!(key = %key, %reason, "trigger rejected");
                    if matches!(reason, RejectReason::BlackoutWindow { .. }) {
                        // Bookkeeping only: blackout misses are cancelled at
                        // the window's end, never executed late.
                        self.missed.insert(key, now);
                    }
                    return;
                }
            }
        }

        let task = {
            let entry = &mut self.entries[idx];
            entry.last_attempt = Some(now);
            TaskRequest {
                tenant_id: entry.tenant_id.clone(),
                job_name: entry.job_name.clone(),
                priority: entry.priority,
                enqueued_at: now,
                flags: SubmitFlags::scheduled(),
            }
        };

        info!(key = %key, "triggering job");
        self.executor.submit(task).await;
        self.rate_limits.record_at(&key, now);
        self.entries[idx].last_run = Some(now);
        self.missed.remove(&key);
    }

    /// Admission pipeline, evaluated in fixed order; the first failing
    /// check wins.
    pub async fn pre_execution_checks(
        &mut self,
        idx: usize,
        now: DateTime<Utc>,
    ) -> AdmissionDecision {
        let key = self.entries[idx].job_key();

        if self.paused.contains(&key) {
            return AdmissionDecision::Denied(RejectReason::Paused);
        }

        if self.blackout.is_active_at(now) {
            return AdmissionDecision::Denied(RejectReason::BlackoutWindow {
                period: self.blackout.label(),
            });
        }

        match self.rate_limits.check_at(&key, now) {
            Some(LimitExceeded::Hourly) => {
                return AdmissionDecision::Denied(RejectReason::HourlyRateLimitExceeded)
            }
            Some(LimitExceeded::Daily) => {
                return AdmissionDecision::Denied(RejectReason::DailyRateLimitExceeded)
            }
            None => {}
        }

        let entry = &self.entries[idx];
        let min_secs = self.intervals.bounds_for(&entry.job_name).min_secs as i64;
        if let Some(last_run) = entry.last_run {
            let elapsed = (now - last_run).num_seconds();
            if elapsed < min_secs {
                return AdmissionDecision::Denied(RejectReason::MinIntervalNotMet {
                    remaining_secs: min_secs - elapsed,
                });
            }
        }

        let capacity = self.executor.capacity_status().await;
        if capacity.at_capacity() {
            return AdmissionDecision::Denied(RejectReason::ExecutorAtCapacity);
        }

        AdmissionDecision::Allowed
    }

    // ── Blackout edge handling ──────────────────────────────────────

    /// Compare blackout state to the previous check; on the falling edge,
    /// discard every missed entry and raise one aggregate alert.
    pub async fn blackout_edge_tick(&mut self, now: DateTime<Utc>) {
        if !self.blackout.enabled {
            return;
        }
        let active = self.blackout.is_active_at(now);
        if !active && self.was_blackout {
            info!("blackout window ended, schedules resume");
            if !self.missed.is_empty() {
                let cancelled = self.missed.len();
                self.missed.clear();
                info!(cancelled, "cancelled schedules missed during blackout window");
                self.alert(&format!(
                    "Cancelled {} tasks that were blocked by the blackout window",
                    cancelled
                ))
                .await;
            }
        }
        self.was_blackout = active;
    }

    // ── Health monitoring / overdue recovery ────────────────────────

    /// Detect schedules that failed to fire for over twice their maximum
    /// interval. Misses whose expected run time fell inside the blackout
    /// window are cancelled; genuine scheduling failures are force-executed.
    ///
    /// Classification inspects only the single expected run time
    /// (`last_attempt + max_interval`); outages spanning several window
    /// edges can misclassify. Known approximation.
    pub async fn health_tick(&mut self, now: DateTime<Utc>) {
        if self.blackout.is_active_at(now) {
            return;
        }

        for idx in 0..self.entries.len() {
            let (key, job_name, last_attempt) = {
                let e = &self.entries[idx];
                (e.job_key(), e.job_name.clone(), e.last_attempt)
            };
            if self.paused.contains(&key) {
                continue;
            }
            let Some(last_attempt) = last_attempt else {
                continue;
            };

            let max_secs = self.intervals.bounds_for(&job_name).max_secs as i64;
            let since = (now - last_attempt).num_seconds();
            if since <= max_secs * 2 {
                continue;
            }
            let minutes_overdue = since / 60;
            let expected = last_attempt + Duration::seconds(max_secs);

            if self.blackout.contains_hour(self.blackout.hour_at(expected)) {
                self.entries[idx].last_attempt = Some(now);
                info!(
                    key = %key,
                    minutes_overdue,
                    "cancelled overdue run missed during blackout window"
                );
                if self.should_alert(&key, now, Duration::hours(24)) {
                    self.alert(&format!(
                        "Cancelled overdue: {} ({}m) - blocked by blackout window",
                        key, minutes_overdue
                    ))
                    .await;
                }
            } else {
                warn!(key = %key, minutes_overdue, "schedule overdue, recovering");
                if self.should_alert(&key, now, Duration::hours(1)) {
                    self.alert(&format!(
                        "Schedule overdue: {} ({}m) - recovering",
                        key, minutes_overdue
                    ))
                    .await;
                }
                self.handle_trigger(idx, now, true).await;
            }
        }
    }

    fn should_alert(&mut self, key: &str, now: DateTime<Utc>, min_gap: Duration) -> bool {
        match self.overdue_alerts.get(key) {
            Some(last) if now - *last <= min_gap => false,
            _ => {
                self.overdue_alerts.insert(key.to_string(), now);
                true
            }
        }
    }

    // ── Manual controls ─────────────────────────────────────────────

    /// Pause one job, or every job of a tenant. Returns how many keys were
    /// paused.
    pub fn pause(&mut self, tenant_id: &str, job_name: Option<&str>) -> usize {
        let keys = self.control_keys(tenant_id, job_name);
        for key in &keys {
            self.paused.insert(key.clone());
        }
        info!(tenant = tenant_id, count = keys.len(), "paused schedules");
        keys.len()
    }

    /// Resume one job, or every job of a tenant. Returns how many keys were
    /// resumed.
    pub fn resume(&mut self, tenant_id: &str, job_name: Option<&str>) -> usize {
        let keys = self.control_keys(tenant_id, job_name);
        let mut resumed = 0;
        for key in &keys {
            if self.paused.remove(key) {
                resumed += 1;
            }
        }
        info!(tenant = tenant_id, count = resumed, "resumed schedules");
        resumed
    }

    fn control_keys(&self, tenant_id: &str, job_name: Option<&str>) -> Vec<String> {
        match job_name {
            Some(job) => vec![job_key(tenant_id, job)],
            None => self
                .entries
                .iter()
                .filter(|e| e.tenant_id == tenant_id)
                .map(ScheduleEntry::job_key)
                .collect(),
        }
    }

    /// Run a job immediately, bypassing its trigger and the rate/interval
    /// checks — but not executor capacity. Always high priority.
    pub async fn force_run(
        &mut self,
        tenant_id: &str,
        job_name: &str,
    ) -> Result<AdmissionDecision, SchedulerError> {
        if !self
            .entries
            .iter()
            .any(|e| e.tenant_id == tenant_id && e.job_name == job_name)
        {
            return Err(SchedulerError::ScheduleNotFound(job_key(tenant_id, job_name)));
        }

        let capacity = self.executor.capacity_status().await;
        if capacity.at_capacity() {
            return Ok(AdmissionDecision::Denied(RejectReason::ExecutorAtCapacity));
        }

        info!(tenant = tenant_id, job = job_name, "force running");
        let task = TaskRequest::new(tenant_id, job_name, Priority::High)
            .with_flags(SubmitFlags::manual());
        self.executor.submit(task).await;
        Ok(AdmissionDecision::Allowed)
    }

    // ── Status ──────────────────────────────────────────────────────

    pub async fn status(&self) -> SchedulerStatus {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> SchedulerStatus {
        let executor = self.executor.capacity_status().await;

        let mut upcoming: Vec<(DateTime<Utc>, UpcomingRun)> = self
            .entries
            .iter()
            .filter(|e| !self.paused.contains(&e.job_key()))
            .filter_map(|e| {
                e.next_occurrence(now).map(|next| {
                    (
                        next,
                        UpcomingRun {
                            tenant_id: e.tenant_id.clone(),
                            job_name: e.job_name.clone(),
                            cron: e.cron_expression.clone(),
                            timezone: e.timezone.to_string(),
                            next_run: Some(next.to_rfc3339()),
                            last_run: e.last_run.map(|t| t.to_rfc3339()),
                        },
                    )
                })
            })
            .collect();
        upcoming.sort_by_key(|(next, _)| *next);

        SchedulerStatus {
            timestamp: now.to_rfc3339(),
            total_schedules: self.entries.len(),
            active_schedules: self.entries.len().saturating_sub(self.paused.len()),
            paused_schedules: self.paused.len(),
            missed_schedules: self.missed.len(),
            blackout: BlackoutStatus {
                enabled: self.blackout.enabled,
                period: self.blackout.label(),
                timezone: self.blackout.tz.to_string(),
                currently_active: self.blackout.is_active_at(now),
            },
            next_runs: upcoming.into_iter().take(10).map(|(_, r)| r).collect(),
            executor,
        }
    }

    // ── Persistence & lifecycle ─────────────────────────────────────

    fn rate_limit_path(&self) -> PathBuf {
        self.config.state_dir.join(RATE_LIMIT_FILE)
    }

    pub fn save_rate_limits(&self) {
        self.rate_limits.save(&self.rate_limit_path());
    }

    /// Drive all timers until `shutdown` is signalled, then flush state and
    /// stop the executor.
    pub async fn run(mut self, shutdown: Arc<Notify>) {
        let mut trigger_iv = tokio::time::interval(StdDuration::from_secs(TRIGGER_TICK_SECS));
        let mut edge_iv = tokio::time::interval(StdDuration::from_secs(BLACKOUT_EDGE_SECS));
        let mut health_iv = tokio::time::interval(self.config.health_check_interval());
        let mut flush_iv = tokio::time::interval(StdDuration::from_secs(RATE_LIMIT_FLUSH_SECS));

        // Consume the immediate first tick of each interval.
        trigger_iv.tick().await;
        edge_iv.tick().await;
        health_iv.tick().await;
        flush_iv.tick().await;

        let mut prev = Utc::now();
        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = trigger_iv.tick() => {
                    let now = Utc::now();
                    self.trigger_tick(prev, now).await;
                    prev = now;
                }
                _ = edge_iv.tick() => self.blackout_edge_tick(Utc::now()).await,
                _ = health_iv.tick() => self.health_tick(Utc::now()).await,
                _ = flush_iv.tick() => self.save_rate_limits(),
            }
        }

        info!("scheduler shutting down");
        self.save_rate_limits();
        self.executor.shutdown().await;
    }

    /// Best-effort notification; a failed delivery never aborts scheduling.
    async fn alert(&self, message: &str) {
        if let Err(e) = self.notifier.alert("scheduler", message).await {
            warn!(error = %e, "failed to deliver alert");
        }
    }
}
