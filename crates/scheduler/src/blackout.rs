//! Daily blackout window.
//!
//! A configured wall-clock range during which no new task admission is
//! granted. Supports both non-wrapping ranges (02:00-06:00) and ranges
//! wrapping past midnight (23:00-06:00). Hours are interpreted in the
//! configured IANA timezone.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

use fleet_core::BlackoutConfig;

#[derive(Debug, Clone)]
pub struct BlackoutWindow {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
    pub tz: Tz,
}

impl BlackoutWindow {
    pub fn from_config(config: &BlackoutConfig) -> Self {
        let tz = config.timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(timezone = %config.timezone, "invalid blackout timezone, using UTC");
            Tz::UTC
        });
        Self {
            enabled: config.enabled,
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            tz,
        }
    }

    /// Whether `hour` falls inside the configured range, ignoring `enabled`.
    fn in_range(&self, hour: u32) -> bool {
        if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    /// Whether the window is enabled and `hour` falls inside it.
    pub fn contains_hour(&self, hour: u32) -> bool {
        self.enabled && self.in_range(hour)
    }

    /// Wall-clock hour of `t` in the window's timezone.
    pub fn hour_at(&self, t: DateTime<Utc>) -> u32 {
        self.tz.from_utc_datetime(&t.naive_utc()).hour()
    }

    /// Whether the window is active at instant `t`.
    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        self.contains_hour(self.hour_at(t))
    }

    /// Display label, e.g. "23:00 - 06:00".
    pub fn label(&self) -> String {
        format!("{:02}:00 - {:02}:00", self.start_hour, self.end_hour)
    }
}

impl Default for BlackoutWindow {
    fn default() -> Self {
        Self::from_config(&BlackoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: u32, end: u32) -> BlackoutWindow {
        BlackoutWindow {
            enabled: true,
            start_hour: start,
            end_hour: end,
            tz: Tz::UTC,
        }
    }

    #[test]
    fn wrapping_range_23_to_6() {
        let w = window(23, 6);
        for h in [23, 0, 1, 2, 3, 4, 5] {
            assert!(w.contains_hour(h), "hour {} should be blackout", h);
        }
        for h in 6..23 {
            assert!(!w.contains_hour(h), "hour {} should not be blackout", h);
        }
    }

    #[test]
    fn normal_range_2_to_6() {
        let w = window(2, 6);
        for h in [2, 3, 4, 5] {
            assert!(w.contains_hour(h), "hour {} should be blackout", h);
        }
        for h in (0..24).filter(|h| !(2..6).contains(h)) {
            assert!(!w.contains_hour(h), "hour {} should not be blackout", h);
        }
    }

    #[test]
    fn disabled_window_contains_nothing() {
        let mut w = window(23, 6);
        w.enabled = false;
        assert!(!w.contains_hour(23));
        assert!(!w.is_active_at(Utc::now()));
    }

    #[test]
    fn activity_follows_timezone() {
        let mut w = window(2, 6);
        w.tz = "Asia/Jakarta".parse().unwrap();
        // 20:00 UTC = 03:00 WIB (UTC+7): inside the window.
        let t = chrono::DateTime::parse_from_rfc3339("2026-01-15T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(w.is_active_at(t));
        // 03:00 UTC = 10:00 WIB: outside.
        let t = chrono::DateTime::parse_from_rfc3339("2026-01-15T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(!w.is_active_at(t));
    }

    #[test]
    fn invalid_timezone_falls_back_to_utc() {
        let w = BlackoutWindow::from_config(&BlackoutConfig {
            enabled: true,
            start_hour: 23,
            end_hour: 6,
            timezone: "Not/AZone".to_string(),
        });
        assert_eq!(w.tz, Tz::UTC);
    }

    #[test]
    fn label_formats_hours() {
        assert_eq!(window(23, 6).label(), "23:00 - 06:00");
        assert_eq!(window(2, 6).label(), "02:00 - 06:00");
    }
}
