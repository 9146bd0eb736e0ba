//! Schedule documents and trigger state.
//!
//! Each tenant authors a `schedule.json` document listing its recurring
//! runs. Loading turns every enabled run of every enabled tenant into a
//! [`ScheduleEntry`] with a parsed trigger expression. Malformed documents
//! are skipped with a warning — a bad tenant file never fails the load.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::Deserialize;
use tracing::{debug, info, warn};

use fleet_core::{job_key, Priority};

use crate::blackout::BlackoutWindow;
use crate::error::SchedulerError;
use crate::executor::TenantInfo;
use crate::trigger::{build_expression, normalize_cron};

// ── Documents ───────────────────────────────────────────────────────

/// One recurring run inside a tenant's schedule document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEntry {
    pub bot: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    /// `HH:MM` wall-clock time; ignored when `cron` is set.
    #[serde(default)]
    pub time: Option<String>,
    /// Weekday names, or `["daily"]`.
    #[serde(default)]
    pub days: Option<Vec<String>>,
    /// Raw 5-field cron expression, used verbatim.
    #[serde(default)]
    pub cron: Option<String>,
    /// Jitter radius in minutes (clamped to 30). Defaults to 15.
    #[serde(default)]
    pub randomize_minutes: Option<i64>,
}

/// Per-tenant schedule document, externally authored.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDocument {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub runs: Vec<RunEntry>,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> Priority {
    Priority::Normal
}

// ── Schedule entries ────────────────────────────────────────────────

/// Live trigger state for one (tenant, job) pair. Created at load time,
/// mutated in place on execution, destroyed only on full reload.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub tenant_id: String,
    pub job_name: String,
    /// The 5-field expression as displayed in status output.
    pub cron_expression: String,
    /// Parsed 6-field schedule used for due checks.
    pub schedule: Schedule,
    pub priority: Priority,
    pub timezone: Tz,
    pub last_run: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    pub fn job_key(&self) -> String {
        job_key(&self.tenant_id, &self.job_name)
    }

    /// Whether the trigger has an occurrence in `(after, until]`, evaluated
    /// in the entry's timezone. Each occurrence lands in exactly one
    /// consecutive tick window, so it fires exactly once.
    pub fn due_between(&self, after: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        let after_local = after.with_timezone(&self.timezone);
        match self.schedule.after(&after_local).next() {
            Some(next) => next.with_timezone(&Utc) <= until,
            None => false,
        }
    }

    /// Next trigger occurrence after `now`.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let now_local = now.with_timezone(&self.timezone);
        self.schedule
            .after(&now_local)
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

// ── Job interval bounds ─────────────────────────────────────────────

/// Execution-interval bounds for one job type, in seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct JobIntervalBounds {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for JobIntervalBounds {
    fn default() -> Self {
        Self {
            min_secs: 1_800,
            max_secs: 7_200,
        }
    }
}

/// Per-job interval table with a shared default. `min_secs` gates the
/// admission pipeline's minimum-interval check; `max_secs` drives the
/// health monitor's overdue threshold.
#[derive(Debug, Clone, Default)]
pub struct JobIntervals {
    table: HashMap<String, JobIntervalBounds>,
}

impl JobIntervals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(mut self, job_name: &str, bounds: JobIntervalBounds) -> Self {
        self.table.insert(job_name.to_string(), bounds);
        self
    }

    pub fn bounds_for(&self, job_name: &str) -> JobIntervalBounds {
        self.table.get(job_name).copied().unwrap_or_default()
    }
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load schedule entries for every enabled tenant.
///
/// Reads `<dir>/<tenant>/schedule.json`; missing files are skipped
/// silently, malformed ones with a warning. Returns the built entries plus
/// any trigger-registration failures (invalid cron expressions) for the
/// caller to alert on.
pub fn load_schedules(
    dir: &Path,
    tenants: &[TenantInfo],
    blackout: &BlackoutWindow,
) -> (Vec<ScheduleEntry>, Vec<SchedulerError>) {
    let mut entries = Vec::new();
    let mut failures = Vec::new();

    for tenant in tenants.iter().filter(|t| t.enabled) {
        let path = dir.join(&tenant.id).join("schedule.json");
        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(tenant = %tenant.id, error = %e, "failed to read schedule document");
                continue;
            }
        };

        let doc: ScheduleDocument = match serde_json::from_str(&data) {
            Ok(d) => d,
            Err(e) => {
                warn!(tenant = %tenant.id, error = %e, "failed to parse schedule document");
                continue;
            }
        };
        if !doc.enabled {
            debug!(tenant = %tenant.id, "schedule document disabled, skipping");
            continue;
        }

        let timezone = doc
            .timezone
            .as_deref()
            .unwrap_or("UTC")
            .parse::<Tz>()
            .unwrap_or_else(|_| {
                warn!(tenant = %tenant.id, tz = ?doc.timezone, "invalid timezone, using UTC");
                Tz::UTC
            });

        for run in doc.runs.iter().filter(|r| r.enabled && !r.bot.is_empty()) {
            let expression = build_expression(run, blackout);
            match Schedule::from_str(&normalize_cron(&expression)) {
                Ok(schedule) => entries.push(ScheduleEntry {
                    tenant_id: tenant.id.clone(),
                    job_name: run.bot.clone(),
                    cron_expression: expression,
                    schedule,
                    priority: run.priority,
                    timezone,
                    last_run: None,
                    last_attempt: None,
                }),
                Err(e) => failures.push(SchedulerError::ScheduleSetup {
                    key: job_key(&tenant.id, &run.bot),
                    reason: e.to_string(),
                }),
            }
        }
    }

    info!(count = entries.len(), "loaded scheduled tasks");
    (entries, failures)
}
