//! Fair tenant rotation.
//!
//! Standalone fairness utility: given the set of tenants that currently have
//! work available, pick which one to service next. Rotation is round-robin
//! over registration order, skipping tenants still inside a cooldown window;
//! when every candidate is cooling, the least-recently-serviced one is
//! returned anyway so callers always make forward progress.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cooldown status for one account in [`RotationStats`].
#[derive(Debug, Clone, Serialize)]
pub struct CooldownEntry {
    pub account_id: String,
    pub remaining_ms: i64,
}

/// Last-service record for one account.
#[derive(Debug, Clone, Serialize)]
pub struct LastProcessedEntry {
    /// RFC 3339 timestamp, or "never".
    pub timestamp: String,
    pub seconds_ago: i64,
}

/// Distribution fairness summary.
#[derive(Debug, Clone, Serialize)]
pub struct FairnessStats {
    pub mean: f64,
    pub std_dev: f64,
    /// `max(0, 100 − 10·stddev)`; 100 with a single account. A coarse
    /// load-balance health indicator, not a guarantee.
    pub fairness_score: f64,
}

/// Point-in-time rotation statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RotationStats {
    pub total_accounts: usize,
    pub process_count: HashMap<String, u64>,
    pub last_processed: HashMap<String, LastProcessedEntry>,
    pub in_cooldown: Vec<CooldownEntry>,
    pub ready_accounts: Vec<String>,
    pub fairness: Option<FairnessStats>,
}

/// Round-robin tenant selection with cooldown awareness.
#[derive(Debug)]
pub struct AccountRotation {
    /// Registration order; position doubles as fairness priority.
    account_order: Vec<String>,
    last_processed: HashMap<String, DateTime<Utc>>,
    process_count: HashMap<String, u64>,
    cooldown: Duration,
    cursor: usize,
}

impl AccountRotation {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            account_order: Vec::new(),
            last_processed: HashMap::new(),
            process_count: HashMap::new(),
            cooldown,
            cursor: 0,
        }
    }

    /// Add an account to the rotation. Idempotent.
    pub fn register_account(&mut self, account_id: &str) {
        if !self.account_order.iter().any(|a| a == account_id) {
            self.account_order.push(account_id.to_string());
            self.process_count.entry(account_id.to_string()).or_insert(0);
        }
    }

    /// Pick the next account to service from the available set.
    pub fn next_account(&mut self, available: &[String]) -> Option<String> {
        self.next_account_at(available, Utc::now())
    }

    /// Selection against an explicit `now` (deterministic for tests).
    pub fn next_account_at(&mut self, available: &[String], now: DateTime<Utc>) -> Option<String> {
        if available.is_empty() {
            return None;
        }
        if available.len() == 1 {
            return Some(available[0].clone());
        }

        let ready: Vec<String> = available
            .iter()
            .filter(|id| match self.last_processed.get(*id) {
                Some(last) => {
                    (now - *last).to_std().unwrap_or(Duration::ZERO) >= self.cooldown
                }
                None => true,
            })
            .cloned()
            .collect();

        // All candidates cooling: fall back to strict least-recently-used so
        // the caller never deadlocks waiting for a cooldown to expire.
        if ready.is_empty() {
            return self.least_recently_processed(available);
        }

        self.round_robin_select(ready)
    }

    /// Round-robin over the ready set, ordered by registration position
    /// (unregistered accounts sort last). The cursor wraps by
    /// registration-order length.
    fn round_robin_select(&mut self, mut accounts: Vec<String>) -> Option<String> {
        accounts.sort_by_key(|id| {
            self.account_order
                .iter()
                .position(|a| a == id)
                .unwrap_or(usize::MAX)
        });

        let id = accounts[self.cursor % accounts.len()].clone();
        if !self.account_order.is_empty() {
            self.cursor = (self.cursor + 1) % self.account_order.len();
        }
        Some(id)
    }

    fn least_recently_processed(&self, accounts: &[String]) -> Option<String> {
        accounts
            .iter()
            .min_by_key(|id| {
                // Never-processed sorts before any real timestamp.
                self.last_processed
                    .get(*id)
                    .copied()
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
            })
            .cloned()
    }

    /// Record that an account was serviced, updating its last-processed
    /// time and count. Registers the account if unseen.
    pub fn record_completion(&mut self, account_id: &str) {
        self.record_completion_at(account_id, Utc::now());
    }

    pub fn record_completion_at(&mut self, account_id: &str, now: DateTime<Utc>) {
        self.register_account(account_id);
        self.last_processed.insert(account_id.to_string(), now);
        *self.process_count.entry(account_id.to_string()).or_insert(0) += 1;
    }

    /// Drop an account from the rotation entirely.
    pub fn remove_account(&mut self, account_id: &str) {
        if let Some(i) = self.account_order.iter().position(|a| a == account_id) {
            self.account_order.remove(i);
            self.last_processed.remove(account_id);
            self.process_count.remove(account_id);
        }
    }

    /// Account with the fewest completions, for callers that want absolute
    /// load balance instead of cooldown-aware rotation.
    pub fn least_processed_account(&self, available: &[String]) -> Option<String> {
        available
            .iter()
            .min_by_key(|id| self.process_count.get(*id).copied().unwrap_or(0))
            .cloned()
    }

    /// Reset all counters, keeping registrations.
    pub fn reset(&mut self) {
        self.last_processed.clear();
        self.process_count.clear();
        self.cursor = 0;
    }

    pub fn stats(&self) -> RotationStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> RotationStats {
        let cooldown_ms = self.cooldown.as_millis() as i64;
        let mut last_processed = HashMap::new();
        let mut in_cooldown = Vec::new();
        let mut ready_accounts = Vec::new();

        for id in &self.account_order {
            match self.last_processed.get(id) {
                Some(last) => {
                    let since_ms = (now - *last).num_milliseconds();
                    last_processed.insert(
                        id.clone(),
                        LastProcessedEntry {
                            timestamp: last.to_rfc3339(),
                            seconds_ago: since_ms / 1000,
                        },
                    );
                    if since_ms < cooldown_ms {
                        in_cooldown.push(CooldownEntry {
                            account_id: id.clone(),
                            remaining_ms: cooldown_ms - since_ms,
                        });
                    } else {
                        ready_accounts.push(id.clone());
                    }
                }
                None => {
                    last_processed.insert(
                        id.clone(),
                        LastProcessedEntry {
                            timestamp: "never".to_string(),
                            seconds_ago: -1,
                        },
                    );
                    ready_accounts.push(id.clone());
                }
            }
        }

        let process_count: HashMap<String, u64> = self
            .account_order
            .iter()
            .map(|id| (id.clone(), self.process_count.get(id).copied().unwrap_or(0)))
            .collect();

        let counts: Vec<f64> = self.process_count.values().map(|&c| c as f64).collect();
        let fairness = if counts.is_empty() {
            None
        } else {
            let mean = counts.iter().sum::<f64>() / counts.len() as f64;
            let variance =
                counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / counts.len() as f64;
            let std_dev = variance.sqrt();
            Some(FairnessStats {
                mean: round2(mean),
                std_dev: round2(std_dev),
                fairness_score: if counts.len() > 1 {
                    (100.0 - std_dev * 10.0).max(0.0)
                } else {
                    100.0
                },
            })
        };

        RotationStats {
            total_accounts: self.account_order.len(),
            process_count,
            last_processed,
            in_cooldown,
            ready_accounts,
            fairness,
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).floor() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rotation_with(accounts: &[&str], cooldown: Duration) -> AccountRotation {
        let mut r = AccountRotation::new(cooldown);
        for a in accounts {
            r.register_account(a);
        }
        r
    }

    #[test]
    fn empty_candidates_yield_none() {
        let mut r = rotation_with(&["x"], Duration::ZERO);
        assert_eq!(r.next_account(&[]), None);
    }

    #[test]
    fn single_candidate_returned_directly() {
        let mut r = rotation_with(&[], Duration::from_secs(60));
        assert_eq!(r.next_account(&ids(&["only"])), Some("only".to_string()));
    }

    #[test]
    fn zero_cooldown_cycles_registration_order() {
        let mut r = rotation_with(&["x", "y", "z"], Duration::ZERO);
        let avail = ids(&["x", "y", "z"]);
        let now = Utc::now();

        let mut visits = Vec::new();
        for _ in 0..6 {
            let picked = r.next_account_at(&avail, now).unwrap();
            r.record_completion_at(&picked, now);
            visits.push(picked);
        }
        assert_eq!(visits, vec!["x", "y", "z", "x", "y", "z"]);
    }

    #[test]
    fn cooldown_filters_recently_processed() {
        let mut r = rotation_with(&["x", "y"], Duration::from_secs(60));
        let now = Utc::now();
        r.record_completion_at("x", now);

        // x is cooling, y is ready.
        let picked = r.next_account_at(&ids(&["x", "y"]), now + chrono::Duration::seconds(5));
        assert_eq!(picked, Some("y".to_string()));
    }

    #[test]
    fn all_cooling_falls_back_to_least_recently_used() {
        let mut r = rotation_with(&["x", "y"], Duration::from_secs(60));
        let now = Utc::now();
        r.record_completion_at("x", now - chrono::Duration::seconds(30));
        r.record_completion_at("y", now - chrono::Duration::seconds(10));

        // Both inside cooldown: never blocks, oldest wins.
        let picked = r.next_account_at(&ids(&["x", "y"]), now);
        assert_eq!(picked, Some("x".to_string()));
    }

    #[test]
    fn never_processed_wins_lru_fallback() {
        let mut r = rotation_with(&["x", "y"], Duration::from_secs(60));
        let now = Utc::now();
        r.record_completion_at("x", now - chrono::Duration::seconds(1));
        r.record_completion_at("y", now - chrono::Duration::seconds(2));
        r.register_account("z");

        // z was never processed; with everyone else cooling it is oldest.
        let picked = r.next_account_at(&ids(&["x", "y", "z"]), now);
        assert_eq!(picked, Some("z".to_string()));
    }

    #[test]
    fn unregistered_candidates_sort_last() {
        let mut r = rotation_with(&["x", "y"], Duration::ZERO);
        let picked = r.next_account_at(&ids(&["ghost", "x"]), Utc::now());
        assert_eq!(picked, Some("x".to_string()));
    }

    #[test]
    fn record_completion_auto_registers() {
        let mut r = AccountRotation::new(Duration::from_secs(60));
        r.record_completion("new");
        let stats = r.stats();
        assert_eq!(stats.total_accounts, 1);
        assert_eq!(stats.process_count["new"], 1);
    }

    #[test]
    fn remove_account_clears_state() {
        let mut r = rotation_with(&["x", "y"], Duration::ZERO);
        r.record_completion("x");
        r.remove_account("x");
        let stats = r.stats();
        assert_eq!(stats.total_accounts, 1);
        assert!(!stats.process_count.contains_key("x"));
    }

    #[test]
    fn least_processed_account_picks_minimum() {
        let mut r = rotation_with(&["x", "y", "z"], Duration::ZERO);
        r.record_completion("x");
        r.record_completion("x");
        r.record_completion("y");
        assert_eq!(
            r.least_processed_account(&ids(&["x", "y", "z"])),
            Some("z".to_string())
        );
    }

    #[test]
    fn stats_reports_cooldown_and_ready() {
        let mut r = rotation_with(&["x", "y"], Duration::from_secs(60));
        let now = Utc::now();
        r.record_completion_at("x", now - chrono::Duration::seconds(10));

        let stats = r.stats_at(now);
        assert_eq!(stats.in_cooldown.len(), 1);
        assert_eq!(stats.in_cooldown[0].account_id, "x");
        assert!(stats.in_cooldown[0].remaining_ms > 0);
        assert_eq!(stats.ready_accounts, vec!["y".to_string()]);
        assert_eq!(stats.last_processed["y"].timestamp, "never");
    }

    #[test]
    fn reset_clears_counters_keeps_registrations() {
        let mut r = rotation_with(&["x"], Duration::ZERO);
        r.record_completion("x");
        r.reset();
        let stats = r.stats();
        assert_eq!(stats.total_accounts, 1);
        assert_eq!(stats.process_count["x"], 0);
        assert_eq!(stats.last_processed["x"].timestamp, "never");
    }

    #[test]
    fn fairness_score_is_100_for_single_account() {
        let mut r = AccountRotation::new(Duration::ZERO);
        r.record_completion("solo");
        let fairness = r.stats().fairness.unwrap();
        assert_eq!(fairness.fairness_score, 100.0);
    }

    #[test]
    fn fairness_score_drops_with_skew() {
        let mut r = rotation_with(&["x", "y"], Duration::ZERO);
        for _ in 0..10 {
            r.record_completion("x");
        }
        let fairness = r.stats().fairness.unwrap();
        assert!(fairness.fairness_score < 100.0);
        assert!(fairness.fairness_score >= 0.0);
    }
}
