//! Shared task and priority types.
//!
//! A [`TaskRequest`] is the unit of work handed from the scheduler to the
//! executor. It is immutable once enqueued; ownership transfers to whichever
//! queue currently holds it and then to the executor on dequeue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a priority name does not match any known tier.
#[derive(Debug, Error)]
#[error("invalid priority: {0}")]
pub struct InvalidPriority(pub String);

/// Task execution priority. Tiers are strictly ordered: High is always
/// drained before Normal, Normal before Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// All tiers in drain order.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    /// Strict parse: unknown names are an error.
    pub fn from_name(name: &str) -> Result<Self, InvalidPriority> {
        match name.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(InvalidPriority(other.to_string())),
        }
    }

    /// Lenient parse used at convenience-wrapper boundaries: unknown or
    /// empty names normalize to Normal instead of failing.
    pub fn from_name_lenient(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Priority::Normal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission flags carried alongside a task through the executor boundary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubmitFlags {
    /// Ask the executor to validate the tenant's credentials before running.
    pub validate_credentials: bool,
    /// Set when the task came from a recurring trigger.
    pub scheduler_triggered: bool,
    /// Set when the task came from a manual force-run.
    pub manual_trigger: bool,
}

impl SubmitFlags {
    pub fn scheduled() -> Self {
        Self {
            validate_credentials: true,
            scheduler_triggered: true,
            manual_trigger: false,
        }
    }

    pub fn manual() -> Self {
        Self {
            validate_credentials: true,
            scheduler_triggered: false,
            manual_trigger: true,
        }
    }
}

/// A unit of work owned by whichever queue currently holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub tenant_id: String,
    pub job_name: String,
    pub priority: Priority,
    /// Stamped at insertion by the holding queue.
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub flags: SubmitFlags,
}

impl TaskRequest {
    pub fn new(tenant_id: impl Into<String>, job_name: impl Into<String>, priority: Priority) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            job_name: job_name.into(),
            priority,
            enqueued_at: Utc::now(),
            flags: SubmitFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: SubmitFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Canonical `tenant_job` key used for rate limits, pauses and logs.
    pub fn job_key(&self) -> String {
        job_key(&self.tenant_id, &self.job_name)
    }
}

/// Build the canonical `tenant_job` key.
pub fn job_key(tenant_id: &str, job_name: &str) -> String {
    format!("{}_{}", tenant_id, job_name)
}
