//! Environment-driven configuration.
//!
//! Every knob reads from the environment with a safe default; malformed
//! values fall back silently rather than failing startup. Call
//! [`load_dotenv`] once before building configs.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

// ── Queue ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum time a task may wait before being dropped at dequeue.
    pub item_timeout_ms: u64,
    /// Hard cap on total queued tasks.
    pub max_size: usize,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            item_timeout_ms: env_u64("QUEUE_TIMEOUT", 300_000),
            max_size: env_usize("QUEUE_MAX_SIZE", 100),
        }
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            item_timeout_ms: 300_000,
            max_size: 100,
        }
    }
}

// ── Account rotation ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Minimum time between servicing the same tenant.
    pub cooldown_ms: u64,
}

impl RotationConfig {
    pub fn from_env() -> Self {
        Self {
            cooldown_ms: env_u64("ACCOUNT_ROTATION_COOLDOWN", 60_000),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self { cooldown_ms: 60_000 }
    }
}

// ── Blackout window ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackoutConfig {
    pub enabled: bool,
    /// Wall-clock hour (0-23) the window opens.
    pub start_hour: u32,
    /// Wall-clock hour (0-23) the window closes. May be below `start_hour`
    /// for windows wrapping past midnight.
    pub end_hour: u32,
    /// IANA timezone the hours are interpreted in.
    pub timezone: String,
}

impl BlackoutConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env_bool("BLACKOUT_ENABLED", true),
            start_hour: env_u32("BLACKOUT_START", 23).min(23),
            end_hour: env_u32("BLACKOUT_END", 6).min(23),
            timezone: env_or("BLACKOUT_TZ", "UTC"),
        }
    }
}

impl Default for BlackoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_hour: 23,
            end_hour: 6,
            timezone: "UTC".to_string(),
        }
    }
}

// ── Rate limits ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_runs_per_hour: usize,
    pub max_runs_per_day: usize,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        Self {
            max_runs_per_hour: env_usize("MAX_RUNS_PER_HOUR", 4),
            max_runs_per_day: env_usize("MAX_RUNS_PER_DAY", 30),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_runs_per_hour: 4,
            max_runs_per_day: 30,
        }
    }
}

// ── Scheduler aggregate ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub queue: QueueConfig,
    pub rotation: RotationConfig,
    pub blackout: BlackoutConfig,
    pub rate_limits: RateLimitConfig,
    /// Health-monitor interval in seconds.
    pub health_check_interval_secs: u64,
    /// Status-monitor refresh interval in milliseconds.
    pub monitor_refresh_ms: u64,
    /// Global concurrent-execution ceiling advertised by the executor.
    pub max_concurrent_global: usize,
    /// Directory holding per-tenant schedule documents.
    pub schedules_dir: PathBuf,
    /// Directory for persisted scheduler state (rate limits).
    pub state_dir: PathBuf,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            queue: QueueConfig::from_env(),
            rotation: RotationConfig::from_env(),
            blackout: BlackoutConfig::from_env(),
            rate_limits: RateLimitConfig::from_env(),
            health_check_interval_secs: env_u64("HEALTH_CHECK_INTERVAL", 60),
            monitor_refresh_ms: env_u64("MONITOR_REFRESH_INTERVAL", 5_000),
            max_concurrent_global: env_usize("MAX_CONCURRENT_GLOBAL", 3),
            schedules_dir: PathBuf::from(env_or("SCHEDULES_DIR", "data/schedules")),
            state_dir: PathBuf::from(env_or("STATE_DIR", "data/scheduler")),
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn monitor_refresh(&self) -> Duration {
        Duration::from_millis(self.monitor_refresh_ms)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  queue:     timeout={}ms, max_size={}",
            self.queue.item_timeout_ms,
            self.queue.max_size
        );
        tracing::info!("  rotation:  cooldown={}ms", self.rotation.cooldown_ms);
        tracing::info!(
            "  blackout:  enabled={}, {}:00-{}:00 {}",
            self.blackout.enabled,
            self.blackout.start_hour,
            self.blackout.end_hour,
            self.blackout.timezone
        );
        tracing::info!(
            "  limits:    {}/hour, {}/day",
            self.rate_limits.max_runs_per_hour,
            self.rate_limits.max_runs_per_day
        );
        tracing::info!(
            "  intervals: health={}s, monitor={}ms",
            self.health_check_interval_secs,
            self.monitor_refresh_ms
        );
        tracing::info!("  dirs:      schedules={}, state={}", self.schedules_dir.display(), self.state_dir.display());
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            rotation: RotationConfig::default(),
            blackout: BlackoutConfig::default(),
            rate_limits: RateLimitConfig::default(),
            health_check_interval_secs: 60,
            monitor_refresh_ms: 5_000,
            max_concurrent_global: 3,
            schedules_dir: PathBuf::from("data/schedules"),
            state_dir: PathBuf::from("data/scheduler"),
        }
    }
}
