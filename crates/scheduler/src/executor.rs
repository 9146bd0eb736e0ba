//! Executor boundary.
//!
//! The scheduler never runs jobs itself; it hands admitted tasks to an
//! executor through this narrow interface. Submission is fire-and-forget —
//! the scheduler observes no return value and expects at-most-once
//! delivery with no acknowledgment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fleet_core::TaskRequest;

/// Executor capacity snapshot used by the admission pipeline's final gate.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CapacityStatus {
    pub running: usize,
    pub max_concurrent: usize,
    pub queued: usize,
}

impl CapacityStatus {
    pub fn at_capacity(&self) -> bool {
        self.running >= self.max_concurrent
    }
}

/// One tenant as the executor knows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantInfo {
    pub id: String,
    pub enabled: bool,
    pub has_credentials: bool,
}

/// Result of a bulk credential validation pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CredentialSummary {
    pub valid: usize,
    pub expired: usize,
    pub unknown: usize,
    pub total: usize,
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Hand a task over for execution. Fire-and-forget.
    async fn submit(&self, task: TaskRequest);

    async fn capacity_status(&self) -> CapacityStatus;

    async fn list_tenants(&self) -> Vec<TenantInfo>;

    async fn validate_all_credentials(&self) -> CredentialSummary;

    /// Ask the executor to refresh one tenant's credentials. Best-effort.
    async fn refresh_credentials(&self, tenant_id: &str);

    async fn shutdown(&self);
}
