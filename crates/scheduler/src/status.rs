//! Read-only scheduler status snapshot.

use serde::Serialize;

use crate::executor::CapacityStatus;

#[derive(Debug, Clone, Serialize)]
pub struct BlackoutStatus {
    pub enabled: bool,
    /// Display range, e.g. "23:00 - 06:00".
    pub period: String,
    pub timezone: String,
    pub currently_active: bool,
}

/// One upcoming trigger occurrence.
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingRun {
    pub tenant_id: String,
    pub job_name: String,
    pub cron: String,
    pub timezone: String,
    pub next_run: Option<String>,
    /// RFC 3339, absent when the job never ran.
    pub last_run: Option<String>,
}

/// Point-in-time monitoring surface. Pure read; building it has no side
/// effects on scheduling state.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub timestamp: String,
    pub total_schedules: usize,
    pub active_schedules: usize,
    pub paused_schedules: usize,
    pub missed_schedules: usize,
    pub blackout: BlackoutStatus,
    /// The ten soonest upcoming runs.
    pub next_runs: Vec<UpcomingRun>,
    pub executor: CapacityStatus,
}
