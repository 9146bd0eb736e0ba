//! Queue-backed executor.
//!
//! Models the scheduler→executor hand-off explicitly: submitted tasks land
//! in a [`QueueManager`], a drain step forwards them over an mpsc channel
//! while execution slots are free, and [`AccountRotation`] tracks
//! per-tenant completions for the fairness surface. The channel contract
//! is at-most-once with no acknowledgment — real workers consume the
//! receiver; nothing is retried here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fleet_core::{QueueConfig, RotationConfig, TaskRequest};
use fleet_queue::{AccountRotation, ManagerStatus, QueueManager, RotationStats};

use crate::executor::{CapacityStatus, CredentialSummary, Executor, TenantInfo};

struct Inner {
    queue: QueueManager,
    rotation: AccountRotation,
}

/// An [`Executor`] that holds submitted tasks in a priority queue until a
/// slot is free.
pub struct QueuedExecutor {
    inner: Mutex<Inner>,
    tenants: Vec<TenantInfo>,
    running: AtomicUsize,
    max_concurrent: usize,
    tx: mpsc::UnboundedSender<TaskRequest>,
}

impl QueuedExecutor {
    /// Build the executor and the receiving end of its dispatch channel.
    pub fn new(
        queue_config: QueueConfig,
        rotation_config: RotationConfig,
        max_concurrent: usize,
        tenants: Vec<TenantInfo>,
    ) -> (Self, mpsc::UnboundedReceiver<TaskRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rotation = AccountRotation::new(rotation_config.cooldown());
        for tenant in &tenants {
            rotation.register_account(&tenant.id);
        }
        (
            Self {
                inner: Mutex::new(Inner {
                    queue: QueueManager::new(queue_config),
                    rotation,
                }),
                tenants,
                running: AtomicUsize::new(0),
                max_concurrent,
                tx,
            },
            rx,
        )
    }

    /// Forward queued tasks to the channel while slots are free. Returns
    /// the number of tasks dispatched.
    pub fn drain(&self) -> usize {
        let mut inner = self.inner.lock().expect("dispatch lock poisoned");
        let mut dispatched = 0;

        while self.running.load(Ordering::SeqCst) < self.max_concurrent {
            let Some(task) = inner.queue.dequeue() else {
                break;
            };
            self.running.fetch_add(1, Ordering::SeqCst);
            debug!(tenant = %task.tenant_id, job = %task.job_name, "dispatching task");
            if self.tx.send(task).is_err() {
                // Receiver gone; the slot is never coming back, stop draining.
                self.running.fetch_sub(1, Ordering::SeqCst);
                warn!("dispatch channel closed, dropping task");
                break;
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Report a task finished: frees its slot, records the completion for
    /// rotation fairness, and drains again.
    pub fn task_completed(&self, tenant_id: &str) {
        {
            let mut inner = self.inner.lock().expect("dispatch lock poisoned");
            inner.rotation.record_completion(tenant_id);
        }
        // Saturating decrement: a stray completion must not wrap the count.
        let _ = self
            .running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.drain();
    }

    pub fn queue_status(&self) -> ManagerStatus {
        self.inner.lock().expect("dispatch lock poisoned").queue.status()
    }

    pub fn rotation_stats(&self) -> RotationStats {
        self.inner.lock().expect("dispatch lock poisoned").rotation.stats()
    }
}

#[async_trait]
impl Executor for QueuedExecutor {
    async fn submit(&self, task: TaskRequest) {
        let priority = task.priority;
        {
            let mut inner = self.inner.lock().expect("dispatch lock poisoned");
            if let Err(e) = inner.queue.enqueue_with(task, priority) {
                // Fire-and-forget boundary: a full queue drops the task.
                warn!(error = %e, "submission dropped");
                return;
            }
        }
        self.drain();
    }

    async fn capacity_status(&self) -> CapacityStatus {
        CapacityStatus {
            running: self.running.load(Ordering::SeqCst),
            max_concurrent: self.max_concurrent,
            queued: self.inner.lock().expect("dispatch lock poisoned").queue.len(),
        }
    }

    async fn list_tenants(&self) -> Vec<TenantInfo> {
        self.tenants.clone()
    }

    async fn validate_all_credentials(&self) -> CredentialSummary {
        let with = self.tenants.iter().filter(|t| t.has_credentials).count();
        CredentialSummary {
            valid: with,
            expired: 0,
            unknown: self.tenants.len() - with,
            total: self.tenants.len(),
        }
    }

    async fn refresh_credentials(&self, tenant_id: &str) {
        debug!(tenant = tenant_id, "credential refresh requested");
    }

    async fn shutdown(&self) {
        let mut inner = self.inner.lock().expect("dispatch lock poisoned");
        let pending = inner.queue.len();
        inner.queue.clear();
        info!(pending, "queued executor shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{Priority, SubmitFlags};

    fn tenants(ids: &[&str]) -> Vec<TenantInfo> {
        ids.iter()
            .map(|id| TenantInfo {
                id: id.to_string(),
                enabled: true,
                has_credentials: true,
            })
            .collect()
    }

    fn executor(max: usize) -> (QueuedExecutor, mpsc::UnboundedReceiver<TaskRequest>) {
        QueuedExecutor::new(
            QueueConfig::default(),
            RotationConfig::default(),
            max,
            tenants(&["a", "b"]),
        )
    }

    fn task(tenant: &str, job: &str, priority: Priority) -> TaskRequest {
        TaskRequest::new(tenant, job, priority).with_flags(SubmitFlags::scheduled())
    }

    #[tokio::test]
    async fn submit_dispatches_up_to_capacity() {
        let (exec, mut rx) = executor(2);
        exec.submit(task("a", "j1", Priority::Normal)).await;
        exec.submit(task("a", "j2", Priority::Normal)).await;
        exec.submit(task("b", "j3", Priority::Normal)).await;

        assert_eq!(rx.try_recv().unwrap().job_name, "j1");
        assert_eq!(rx.try_recv().unwrap().job_name, "j2");
        // Third task waits for a free slot.
        assert!(rx.try_recv().is_err());

        let status = exec.capacity_status().await;
        assert_eq!(status.running, 2);
        assert_eq!(status.queued, 1);
        assert!(status.at_capacity());
    }

    #[tokio::test]
    async fn completion_frees_slot_and_drains() {
        let (exec, mut rx) = executor(1);
        exec.submit(task("a", "j1", Priority::Normal)).await;
        exec.submit(task("b", "j2", Priority::Normal)).await;
        assert_eq!(rx.try_recv().unwrap().tenant_id, "a");
        assert!(rx.try_recv().is_err());

        exec.task_completed("a");
        assert_eq!(rx.try_recv().unwrap().tenant_id, "b");

        let stats = exec.rotation_stats();
        assert_eq!(stats.process_count["a"], 1);
    }

    #[tokio::test]
    async fn high_priority_jumps_the_queue() {
        let (exec, mut rx) = executor(1);
        exec.submit(task("a", "first", Priority::Normal)).await;
        exec.submit(task("a", "waiting", Priority::Normal)).await;
        exec.submit(task("a", "urgent", Priority::High)).await;

        exec.task_completed("a");
        // "first" is already in flight; the high-priority task overtakes
        // the earlier normal one.
        rx.try_recv().unwrap();
        assert_eq!(rx.try_recv().unwrap().job_name, "urgent");
    }

    #[tokio::test]
    async fn full_queue_drops_submission() {
        let (exec, _rx) = QueuedExecutor::new(
            QueueConfig {
                max_size: 1,
                ..QueueConfig::default()
            },
            RotationConfig::default(),
            0,
            tenants(&["a"]),
        );
        exec.submit(task("a", "kept", Priority::Normal)).await;
        exec.submit(task("a", "dropped", Priority::Normal)).await;
        assert_eq!(exec.capacity_status().await.queued, 1);
    }

    #[tokio::test]
    async fn credential_summary_counts_tenants() {
        let mut ts = tenants(&["a", "b"]);
        ts[1].has_credentials = false;
        let (exec, _rx) =
            QueuedExecutor::new(QueueConfig::default(), RotationConfig::default(), 1, ts);
        let summary = exec.validate_all_credentials().await;
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.total, 2);
    }
}
