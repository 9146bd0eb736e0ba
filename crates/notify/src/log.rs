//! Channels with no external delivery.

use crate::traits::{Notifier, NotifyError};

/// Emits notifications as structured log events. The default channel when
/// no external delivery is wired in.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn alert(&self, scope: &str, message: &str) -> Result<(), NotifyError> {
        tracing::warn!(scope, "{}", message);
        Ok(())
    }

    async fn success(
        &self,
        tenant_id: &str,
        job_name: &str,
        detail: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(tenant = tenant_id, job = job_name, "{}", detail);
        Ok(())
    }

    async fn error(
        &self,
        tenant_id: &str,
        job_name: &str,
        detail: &str,
    ) -> Result<(), NotifyError> {
        tracing::error!(tenant = tenant_id, job = job_name, "{}", detail);
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}

/// Discards every notification. Useful in tests that don't assert on
/// notification traffic.
#[derive(Debug, Default)]
pub struct NullNotifier;

#[async_trait::async_trait]
impl Notifier for NullNotifier {
    async fn alert(&self, _scope: &str, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn success(
        &self,
        _tenant_id: &str,
        _job_name: &str,
        _detail: &str,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn error(
        &self,
        _tenant_id: &str,
        _job_name: &str,
        _detail: &str,
    ) -> Result<(), NotifyError> {
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_never_fails() {
        let n = LogNotifier;
        assert!(n.alert("scheduler", "test alert").await.is_ok());
        assert!(n.success("t1", "job", "done").await.is_ok());
        assert!(n.error("t1", "job", "boom").await.is_ok());
        assert_eq!(n.channel_name(), "log");
    }

    #[tokio::test]
    async fn null_notifier_discards() {
        let n = NullNotifier;
        assert!(n.alert("scheduler", "dropped").await.is_ok());
        assert_eq!(n.channel_name(), "null");
    }
}
