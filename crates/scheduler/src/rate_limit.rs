//! Per-(tenant, job) sliding-window rate limits.
//!
//! Hourly and daily run counts are kept as ordered timestamp sequences and
//! pruned lazily on every check, so a window never contains entries older
//! than its length after a check. State is snapshotted to disk periodically
//! and on shutdown so limits survive a restart; the snapshot is pruned
//! immediately on reload.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fleet_core::RateLimitConfig;

/// Which window a rejected check ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitExceeded {
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WindowEntry {
    hourly_runs: Vec<DateTime<Utc>>,
    daily_runs: Vec<DateTime<Utc>>,
}

impl WindowEntry {
    fn prune(&mut self, now: DateTime<Utc>) {
        let hour_ago = now - Duration::hours(1);
        let day_ago = now - Duration::days(1);
        self.hourly_runs.retain(|t| *t > hour_ago);
        self.daily_runs.retain(|t| *t > day_ago);
    }
}

/// Tracks run timestamps per `tenant_job` key.
#[derive(Debug)]
pub struct RateLimitTracker {
    windows: HashMap<String, WindowEntry>,
    config: RateLimitConfig,
}

impl RateLimitTracker {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: HashMap::new(),
            config,
        }
    }

    /// Check whether another run is allowed right now. Prunes the key's
    /// windows first; `None` means allowed.
    pub fn check_at(&mut self, key: &str, now: DateTime<Utc>) -> Option<LimitExceeded> {
        let entry = self.windows.entry(key.to_string()).or_default();
        entry.prune(now);

        if entry.hourly_runs.len() >= self.config.max_runs_per_hour {
            return Some(LimitExceeded::Hourly);
        }
        if entry.daily_runs.len() >= self.config.max_runs_per_day {
            return Some(LimitExceeded::Daily);
        }
        None
    }

    /// Record a run against both windows.
    pub fn record_at(&mut self, key: &str, now: DateTime<Utc>) {
        let entry = self.windows.entry(key.to_string()).or_default();
        entry.hourly_runs.push(now);
        entry.daily_runs.push(now);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Write the current windows to `path`. Failures are logged, never fatal.
    pub fn save(&self, path: &Path) {
        let result = serde_json::to_string_pretty(&self.windows)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, json)
            });
        match result {
            Ok(()) => debug!(path = %path.display(), keys = self.windows.len(), "rate limit state saved"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to save rate limit state"),
        }
    }

    /// Load windows from `path`, pruning against `now` immediately. A
    /// missing or unreadable file yields an empty tracker.
    pub fn load(path: &Path, config: RateLimitConfig, now: DateTime<Utc>) -> Self {
        let mut windows: HashMap<String, WindowEntry> = match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(w) => w,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse rate limit state, starting fresh");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read rate limit state, starting fresh");
                HashMap::new()
            }
        };

        for entry in windows.values_mut() {
            entry.prune(now);
        }
        if !windows.is_empty() {
            debug!(keys = windows.len(), "restored rate limit state");
        }
        Self { windows, config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> RateLimitTracker {
        RateLimitTracker::new(RateLimitConfig::default())
    }

    #[test]
    fn allows_until_hourly_cap() {
        let mut t = tracker();
        let now = Utc::now();
        for i in 0..4 {
            assert!(t.check_at("a_job", now).is_none(), "run {} should pass", i);
            t.record_at("a_job", now);
        }
        assert_eq!(t.check_at("a_job", now), Some(LimitExceeded::Hourly));
    }

    #[test]
    fn hourly_window_slides() {
        let mut t = tracker();
        let now = Utc::now();
        for _ in 0..4 {
            t.record_at("a_job", now);
        }
        assert_eq!(t.check_at("a_job", now), Some(LimitExceeded::Hourly));

        // 61 minutes later the hourly entries have aged out.
        let later = now + Duration::minutes(61);
        assert!(t.check_at("a_job", later).is_none());
    }

    #[test]
    fn daily_cap_applies_after_hourly_prune() {
        let mut t = RateLimitTracker::new(RateLimitConfig {
            max_runs_per_hour: 100,
            max_runs_per_day: 5,
        });
        let now = Utc::now();
        for i in 0..5 {
            t.record_at("a_job", now - Duration::hours(i));
        }
        assert_eq!(t.check_at("a_job", now), Some(LimitExceeded::Daily));

        // A day later everything has aged out.
        assert!(t.check_at("a_job", now + Duration::days(1)).is_none());
    }

    #[test]
    fn keys_are_independent() {
        let mut t = tracker();
        let now = Utc::now();
        for _ in 0..4 {
            t.record_at("a_job", now);
        }
        assert_eq!(t.check_at("a_job", now), Some(LimitExceeded::Hourly));
        assert!(t.check_at("b_job", now).is_none());
    }

    #[test]
    fn check_prunes_stale_entries() {
        let mut t = tracker();
        let now = Utc::now();
        t.record_at("a_job", now - Duration::hours(2));
        t.check_at("a_job", now);
        // After a check, windows never contain entries older than their length.
        let entry = &t.windows["a_job"];
        assert!(entry.hourly_runs.is_empty());
        assert_eq!(entry.daily_runs.len(), 1);
    }

    #[test]
    fn save_and_load_round_trip_with_pruning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate_limits.json");
        let now = Utc::now();

        let mut t = tracker();
        t.record_at("a_job", now);
        t.record_at("a_job", now - Duration::hours(3));
        t.save(&path);

        let restored = RateLimitTracker::load(&path, RateLimitConfig::default(), now);
        let entry = &restored.windows["a_job"];
        // The 3h-old hourly entry is pruned on restore; the daily one survives.
        assert_eq!(entry.hourly_runs.len(), 1);
        assert_eq!(entry.daily_runs.len(), 2);
    }

    #[test]
    fn load_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let t = RateLimitTracker::load(
            &dir.path().join("nope.json"),
            RateLimitConfig::default(),
            Utc::now(),
        );
        assert!(t.is_empty());
    }

    #[test]
    fn load_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate_limits.json");
        fs::write(&path, "{ not json").unwrap();
        let t = RateLimitTracker::load(&path, RateLimitConfig::default(), Utc::now());
        assert!(t.is_empty());
    }
}
