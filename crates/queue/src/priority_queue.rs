//! Three-tier priority queue with round-robin tenant fairness.
//!
//! Tiers are drained strictly High → Normal → Low. Within a tier, service
//! rotates across the tenants currently present so a burst of same-tenant
//! tasks cannot monopolize the tier: a per-tier cursor remembers the last
//! served tenant and the next dequeue serves the tenant after it (wrapping),
//! taking that tenant's oldest task.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use fleet_core::{Priority, TaskRequest};

/// Queued-task counts per tier.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TierCounts {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

/// The single longest-waiting task in the queue.
#[derive(Debug, Clone, Serialize)]
pub struct OldestTask {
    pub tenant_id: String,
    pub job_name: String,
    pub wait_secs: i64,
}

/// Point-in-time queue statistics. Pure read, no side effects.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub by_priority: TierCounts,
    pub by_tenant: HashMap<String, usize>,
    pub oldest_task: Option<OldestTask>,
    pub avg_wait_secs: i64,
}

/// In-memory three-tier task queue. Leaf component; no size limits or
/// eviction — see `QueueManager` for those.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    tiers: [Vec<TaskRequest>; 3],
    /// Last-served tenant per tier, for round-robin rotation.
    last_served: HashMap<Priority, String>,
}

fn tier_index(priority: Priority) -> usize {
    match priority {
        Priority::High => 0,
        Priority::Normal => 1,
        Priority::Low => 2,
    }
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task to its tier, stamping `enqueued_at`.
    pub fn enqueue(&mut self, task: TaskRequest, priority: Priority) {
        self.enqueue_at(task, priority, Utc::now());
    }

    /// Add a task with an explicit enqueue timestamp.
    ///
    /// Useful for testing and deterministic replay.
    pub fn enqueue_at(&mut self, mut task: TaskRequest, priority: Priority, now: DateTime<Utc>) {
        task.priority = priority;
        task.enqueued_at = now;
        self.tiers[tier_index(priority)].push(task);
    }

    /// Remove and return the next task: first non-empty tier in precedence
    /// order, served round-robin by tenant.
    pub fn dequeue(&mut self) -> Option<TaskRequest> {
        for priority in Priority::ALL {
            if !self.tiers[tier_index(priority)].is_empty() {
                return Some(self.round_robin_pick(priority));
            }
        }
        None
    }

    /// Round-robin selection within one tier: tenants are ordered by first
    /// appearance, the tenant after the last-served one is chosen (wrapping),
    /// and its oldest task is removed.
    fn round_robin_pick(&mut self, priority: Priority) -> TaskRequest {
        let tier = &mut self.tiers[tier_index(priority)];
        if tier.len() == 1 {
            return tier.remove(0);
        }

        // Tenants present in this tier, in first-appearance order, with the
        // index of each tenant's oldest task.
        let mut tenants: Vec<String> = Vec::new();
        let mut first_index: HashMap<String, usize> = HashMap::new();
        for (i, task) in tier.iter().enumerate() {
            if !first_index.contains_key(&task.tenant_id) {
                first_index.insert(task.tenant_id.clone(), i);
                tenants.push(task.tenant_id.clone());
            }
        }

        let next_pos = match self.last_served.get(&priority) {
            Some(last) => tenants
                .iter()
                .position(|t| t == last)
                .map(|i| (i + 1) % tenants.len())
                .unwrap_or(0),
            None => 0,
        };
        let tenant = tenants[next_pos].clone();

        self.last_served.insert(priority, tenant.clone());
        tier.remove(first_index[&tenant])
    }

    /// Next task without removing it. Does not advance the rotation.
    pub fn peek(&self) -> Option<&TaskRequest> {
        for priority in Priority::ALL {
            if let Some(task) = self.tiers[tier_index(priority)].first() {
                return Some(task);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the first queued task matching `(tenant, job)`, scanning tiers
    /// in precedence order. Returns whether anything was removed.
    pub fn remove(&mut self, tenant_id: &str, job_name: &str) -> bool {
        for tier in &mut self.tiers {
            if let Some(i) = tier
                .iter()
                .position(|t| t.tenant_id == tenant_id && t.job_name == job_name)
            {
                tier.remove(i);
                return true;
            }
        }
        false
    }

    pub fn clear(&mut self) {
        for tier in &mut self.tiers {
            tier.clear();
        }
        self.last_served.clear();
    }

    pub fn stats(&self) -> QueueStats {
        self.stats_at(Utc::now())
    }

    /// Statistics against an explicit `now` (deterministic for tests).
    pub fn stats_at(&self, now: DateTime<Utc>) -> QueueStats {
        let mut by_tenant: HashMap<String, usize> = HashMap::new();
        let mut oldest: Option<OldestTask> = None;
        let mut oldest_wait = -1i64;
        let mut total_wait = 0i64;
        let mut count = 0usize;

        for tier in &self.tiers {
            for task in tier {
                *by_tenant.entry(task.tenant_id.clone()).or_insert(0) += 1;
                let wait = (now - task.enqueued_at).num_seconds();
                total_wait += wait;
                count += 1;
                if wait > oldest_wait {
                    oldest_wait = wait;
                    oldest = Some(OldestTask {
                        tenant_id: task.tenant_id.clone(),
                        job_name: task.job_name.clone(),
                        wait_secs: wait,
                    });
                }
            }
        }

        QueueStats {
            total: count,
            by_priority: TierCounts {
                high: self.tiers[0].len(),
                normal: self.tiers[1].len(),
                low: self.tiers[2].len(),
            },
            by_tenant,
            oldest_task: oldest,
            avg_wait_secs: if count > 0 { total_wait / count as i64 } else { 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(tenant: &str, job: &str) -> TaskRequest {
        TaskRequest::new(tenant, job, Priority::Normal)
    }

    #[test]
    fn dequeue_respects_tier_precedence() {
        let mut q = PriorityQueue::new();
        q.enqueue(task("a", "j1"), Priority::Normal);
        q.enqueue(task("b", "j2"), Priority::High);
        q.enqueue(task("c", "j3"), Priority::Low);

        assert_eq!(q.dequeue().unwrap().tenant_id, "b");
        assert_eq!(q.dequeue().unwrap().tenant_id, "a");
        assert_eq!(q.dequeue().unwrap().tenant_id, "c");
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn high_enqueued_later_still_dequeued_first() {
        let mut q = PriorityQueue::new();
        q.enqueue(task("a", "normal-job"), Priority::Normal);
        q.enqueue(task("a", "high-job"), Priority::High);
        assert_eq!(q.dequeue().unwrap().job_name, "high-job");
    }

    #[test]
    fn round_robin_across_tenants_within_tier() {
        let mut q = PriorityQueue::new();
        // Tenant "a" bursts three tasks before "b" and "c" enqueue one each.
        q.enqueue(task("a", "a1"), Priority::Normal);
        q.enqueue(task("a", "a2"), Priority::Normal);
        q.enqueue(task("a", "a3"), Priority::Normal);
        q.enqueue(task("b", "b1"), Priority::Normal);
        q.enqueue(task("c", "c1"), Priority::Normal);

        let order: Vec<String> = (0..5).map(|_| q.dequeue().unwrap().tenant_id).collect();
        // Rotation alternates away from the burst tenant instead of draining it.
        assert_eq!(order, vec!["a", "b", "a", "c", "a"]);
    }

    #[test]
    fn round_robin_invariant_with_continuous_backlog() {
        let mut q = PriorityQueue::new();
        for i in 0..4 {
            for tenant in ["x", "y", "z"] {
                q.enqueue(task(tenant, &format!("j{}", i)), Priority::Normal);
            }
        }
        // Over any window where all three tenants have tasks waiting, each
        // rotation serves all three exactly once.
        for _ in 0..4 {
            let mut seen: Vec<String> = (0..3).map(|_| q.dequeue().unwrap().tenant_id).collect();
            seen.sort();
            assert_eq!(seen, vec!["x", "y", "z"]);
        }
    }

    #[test]
    fn rotation_survives_tenant_departure() {
        let mut q = PriorityQueue::new();
        q.enqueue(task("a", "a1"), Priority::Normal);
        q.enqueue(task("b", "b1"), Priority::Normal);
        assert_eq!(q.dequeue().unwrap().tenant_id, "a");
        assert_eq!(q.dequeue().unwrap().tenant_id, "b");
        // "a" is still the last multi-tenant pick; a new tenant goes next.
        q.enqueue(task("a", "a2"), Priority::Normal);
        q.enqueue(task("c", "c1"), Priority::Normal);
        assert_eq!(q.dequeue().unwrap().tenant_id, "c");
        assert_eq!(q.dequeue().unwrap().tenant_id, "a");
    }

    #[test]
    fn peek_does_not_advance_rotation() {
        let mut q = PriorityQueue::new();
        q.enqueue(task("a", "a1"), Priority::Normal);
        q.enqueue(task("b", "b1"), Priority::Normal);
        assert_eq!(q.peek().unwrap().tenant_id, "a");
        assert_eq!(q.peek().unwrap().tenant_id, "a");
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn remove_takes_first_match_only() {
        let mut q = PriorityQueue::new();
        q.enqueue(task("a", "j"), Priority::High);
        q.enqueue(task("a", "j"), Priority::Normal);
        assert!(q.remove("a", "j"));
        assert_eq!(q.len(), 1);
        assert!(q.remove("a", "j"));
        assert!(!q.remove("a", "j"));
    }

    #[test]
    fn stats_tracks_oldest_and_average() {
        let mut q = PriorityQueue::new();
        let now = Utc::now();
        q.enqueue_at(task("a", "old"), Priority::Normal, now - chrono::Duration::seconds(90));
        q.enqueue_at(task("b", "new"), Priority::High, now - chrono::Duration::seconds(30));

        let stats = q.stats_at(now);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_priority.high, 1);
        assert_eq!(stats.by_priority.normal, 1);
        assert_eq!(stats.by_tenant["a"], 1);
        let oldest = stats.oldest_task.unwrap();
        assert_eq!(oldest.job_name, "old");
        assert_eq!(oldest.wait_secs, 90);
        assert_eq!(stats.avg_wait_secs, 60);
    }

    #[test]
    fn enqueue_tags_priority() {
        let mut q = PriorityQueue::new();
        q.enqueue(task("a", "j"), Priority::Low);
        assert_eq!(q.peek().unwrap().priority, Priority::Low);
    }
}
