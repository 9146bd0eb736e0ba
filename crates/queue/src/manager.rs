//! Queue management on top of [`PriorityQueue`]: size limits, lenient
//! priority parsing, timeout-based eviction and aggregate accounting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use fleet_core::{Priority, QueueConfig, TaskRequest};

use crate::error::QueueError;
use crate::priority_queue::{PriorityQueue, QueueStats};

/// Lifetime counters for the managed queue.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueCounters {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_timeout: u64,
}

/// Combined queue status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    #[serde(flatten)]
    pub queue: QueueStats,
    pub counters: QueueCounters,
    pub config: QueueConfig,
}

/// Wraps [`PriorityQueue`] with a size cap and lazy timeout eviction.
///
/// Tasks that waited longer than the configured timeout are dropped at
/// dequeue time: counted, logged, and never retried by this layer.
#[derive(Debug)]
pub struct QueueManager {
    queue: PriorityQueue,
    config: QueueConfig,
    counters: QueueCounters,
}

impl QueueManager {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            queue: PriorityQueue::new(),
            config,
            counters: QueueCounters::default(),
        }
    }

    /// Enqueue with a named priority. Unknown names normalize to `normal`;
    /// the only hard failure here is a full queue.
    pub fn enqueue(&mut self, task: TaskRequest, priority: &str) -> Result<(), QueueError> {
        self.enqueue_with(task, Priority::from_name_lenient(priority))
    }

    pub fn enqueue_with(&mut self, task: TaskRequest, priority: Priority) -> Result<(), QueueError> {
        if self.queue.len() >= self.config.max_size {
            return Err(QueueError::QueueFull(self.config.max_size));
        }
        self.queue.enqueue(task, priority);
        self.counters.total_enqueued += 1;
        Ok(())
    }

    /// Pop the next task, dropping it if it aged past the timeout.
    pub fn dequeue(&mut self) -> Option<TaskRequest> {
        self.dequeue_at(Utc::now())
    }

    /// Timeout evaluation against an explicit `now` (deterministic for tests).
    pub fn dequeue_at(&mut self, now: DateTime<Utc>) -> Option<TaskRequest> {
        let task = self.queue.dequeue()?;
        self.counters.total_dequeued += 1;

        let waited = now - task.enqueued_at;
        if waited.num_milliseconds() > self.config.item_timeout_ms as i64 {
            self.counters.total_timeout += 1;
            warn!(
                tenant = %task.tenant_id,
                job = %task.job_name,
                waited_secs = waited.num_seconds(),
                "task timed out in queue, dropping"
            );
            return None;
        }
        Some(task)
    }

    pub fn peek(&self) -> Option<&TaskRequest> {
        self.queue.peek()
    }

    /// Cancel a specific pending task.
    pub fn remove(&mut self, tenant_id: &str, job_name: &str) -> bool {
        self.queue.remove(tenant_id, job_name)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn status(&self) -> ManagerStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> ManagerStatus {
        ManagerStatus {
            queue: self.queue.stats_at(now),
            counters: self.counters,
            config: self.config.clone(),
        }
    }
}
