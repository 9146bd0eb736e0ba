//! Notifier trait definition and shared error types.
//!
//! Notification delivery is an external concern; this crate only models the
//! boundary the scheduler talks to. Every call is best-effort: callers log
//! delivery failures and continue — a failed notification must never abort
//! scheduling.

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// System-level alert scoped to a component (e.g. "scheduler").
    async fn alert(&self, scope: &str, message: &str) -> Result<(), NotifyError>;

    /// Per-job success notification.
    async fn success(&self, tenant_id: &str, job_name: &str, detail: &str)
        -> Result<(), NotifyError>;

    /// Per-job error notification.
    async fn error(&self, tenant_id: &str, job_name: &str, detail: &str)
        -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g. "log", "null").
    fn channel_name(&self) -> &str;
}
