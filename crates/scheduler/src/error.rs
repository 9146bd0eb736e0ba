//! Scheduler error and admission-outcome types.
//!
//! Admission rejections are values, not errors: every queue/admission
//! operation returns a structured outcome instead of raising, and nothing
//! here propagates past the scheduler boundary uncaught.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("schedule not found: {0}")]
    ScheduleNotFound(String),

    /// A trigger expression could not be registered. Alerted once; the
    /// schedule stays inactive until the next full reload.
    #[error("failed to register trigger for {key}: {reason}")]
    ScheduleSetup { key: String, reason: String },

    #[error("state persistence error: {0}")]
    State(#[from] std::io::Error),
}

/// Why an admission attempt was turned down. Non-fatal; the trigger simply
/// retries on its next natural occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Paused,
    BlackoutWindow { period: String },
    HourlyRateLimitExceeded,
    DailyRateLimitExceeded,
    MinIntervalNotMet { remaining_secs: i64 },
    ExecutorAtCapacity,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Paused => write!(f, "schedule paused"),
            RejectReason::BlackoutWindow { period } => {
                write!(f, "blackout window ({})", period)
            }
            RejectReason::HourlyRateLimitExceeded => write!(f, "hourly rate limit exceeded"),
            RejectReason::DailyRateLimitExceeded => write!(f, "daily rate limit exceeded"),
            RejectReason::MinIntervalNotMet { remaining_secs } => {
                write!(f, "min interval not met ({}s remaining)", remaining_secs)
            }
            RejectReason::ExecutorAtCapacity => write!(f, "executor at capacity"),
        }
    }
}

/// Outcome of the pre-execution admission pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed,
    Denied(RejectReason),
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }
}
