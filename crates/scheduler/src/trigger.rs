//! Trigger-expression building.
//!
//! Turns a declarative run entry (time-of-day + days-of-week, or a raw cron
//! expression) into a 5-field cron expression. Derived times are pushed out
//! of the blackout window and given a bounded random minute offset so a
//! fleet of schedules does not fire in lockstep.

use rand::Rng;
use tracing::warn;

use crate::blackout::BlackoutWindow;
use crate::schedule::RunEntry;

const DEFAULT_HOUR: u32 = 9;
const DEFAULT_MINUTE: u32 = 0;
/// Jitter cap, keeps the offset within a single hour roll-over.
const MAX_JITTER_MINUTES: i64 = 30;

/// Build the trigger expression for a run entry. Raw cron expressions are
/// used verbatim; otherwise the entry's time is blackout-adjusted and
/// randomized within its configured jitter.
pub fn build_expression(run: &RunEntry, blackout: &BlackoutWindow) -> String {
    if let Some(cron) = &run.cron {
        if !cron.trim().is_empty() {
            return cron.trim().to_string();
        }
    }

    let jitter = run.randomize_minutes.unwrap_or(15).abs().min(MAX_JITTER_MINUTES);
    let offset = if jitter == 0 {
        0
    } else {
        rand::rng().random_range(-jitter..=jitter)
    };
    build_expression_with_offset(run, blackout, offset)
}

/// Deterministic core of [`build_expression`]: same derivation with an
/// explicit minute offset.
pub fn build_expression_with_offset(
    run: &RunEntry,
    blackout: &BlackoutWindow,
    offset: i64,
) -> String {
    let (hour, minute) = parse_time(run.time.as_deref().unwrap_or("09:00"), &run.bot);
    let adjusted_hour = adjust_for_blackout(hour, blackout, &run.bot);
    let (final_hour, final_minute) = apply_offset(adjusted_hour, minute, offset);
    let days = day_field(run.days.as_deref().unwrap_or(&[]));
    format!("{} {} * * {}", final_minute, final_hour, days)
}

/// Parse an `HH:MM` string. Invalid or non-numeric input falls back to
/// 09:00 with a logged warning rather than failing the load.
fn parse_time(s: &str, job: &str) -> (u32, u32) {
    let mut parts = s.split(':');
    let hour: Option<u32> = parts.next().and_then(|p| p.trim().parse().ok());
    let minute: Option<u32> = match parts.next() {
        None => Some(DEFAULT_MINUTE),
        Some(p) => p.trim().parse().ok(),
    };

    let (mut hour, mut minute) = match (hour, minute) {
        (Some(h), Some(m)) => (h, m),
        _ => {
            warn!(job, time = s, "invalid time format, using default 09:00");
            (DEFAULT_HOUR, DEFAULT_MINUTE)
        }
    };
    if hour > 23 {
        warn!(job, hour, "invalid hour, using {}", DEFAULT_HOUR);
        hour = DEFAULT_HOUR;
    }
    if minute > 59 {
        warn!(job, minute, "invalid minute, using 0");
        minute = 0;
    }
    (hour, minute)
}

/// Push an hour that falls inside the blackout window to the window's end.
fn adjust_for_blackout(hour: u32, blackout: &BlackoutWindow, job: &str) -> u32 {
    if blackout.contains_hour(hour) {
        warn!(
            job,
            from = hour,
            to = blackout.end_hour,
            "requested hour falls in blackout window, shifting past it"
        );
        blackout.end_hour
    } else {
        hour
    }
}

/// Apply a minute offset with hour roll-over, then clamp into valid ranges
/// as a last-resort safety net.
fn apply_offset(hour: u32, minute: u32, offset: i64) -> (u32, u32) {
    let shifted = minute as i64 + offset;
    let (final_hour, final_minute) = if shifted < 0 {
        ((hour as i64 - 1).rem_euclid(24), 60 + shifted)
    } else if shifted > 59 {
        ((hour as i64 + 1) % 24, shifted - 60)
    } else {
        (hour as i64, shifted)
    };
    (
        final_hour.clamp(0, 23) as u32,
        final_minute.clamp(0, 59) as u32,
    )
}

/// Build the day-of-week field: `daily` (or nothing) means every day;
/// otherwise weekday names map to 0-6 with unknown names dropped.
fn day_field(days: &[String]) -> String {
    if days.is_empty() || days.iter().any(|d| d.eq_ignore_ascii_case("daily")) {
        return "*".to_string();
    }
    let numbers: Vec<String> = days
        .iter()
        .filter_map(|d| weekday_number(d))
        .map(|n| n.to_string())
        .collect();
    if numbers.is_empty() {
        "*".to_string()
    } else {
        numbers.join(",")
    }
}

fn weekday_number(name: &str) -> Option<u32> {
    match name.to_ascii_lowercase().as_str() {
        "sunday" => Some(0),
        "monday" => Some(1),
        "tuesday" => Some(2),
        "wednesday" => Some(3),
        "thursday" => Some(4),
        "friday" => Some(5),
        "saturday" => Some(6),
        _ => None,
    }
}

/// Normalize a 5-field cron expression to the `cron` crate's dialect:
/// prepend "0 " for seconds and translate numeric days-of-week to names.
///
/// The `cron` crate requires 6 fields (`sec min hour day-of-month month
/// day-of-week`) and numbers days 1-7 with Sunday = 1, unlike Unix cron's
/// 0-6 with Sunday = 0. Schedule documents use standard 5-field Unix cron,
/// so the day field is rewritten with unambiguous names.
pub fn normalize_cron(cron_5field: &str) -> String {
    let trimmed = cron_5field.trim();
    let mut fields: Vec<String> = trimmed.split_whitespace().map(String::from).collect();
    if fields.len() == 5 {
        fields.insert(0, "0".to_string());
        fields[5] = map_days_field(&fields[5]);
        fields.join(" ")
    } else {
        // Already 6-field (assumed to be in the cron crate's dialect) or
        // non-standard; pass through as-is.
        trimmed.to_string()
    }
}

/// Rewrite Unix day-of-week numbers (0-6, Sunday = 0; 7 also Sunday) as
/// names, preserving lists and ranges. Non-numeric parts pass through.
fn map_days_field(field: &str) -> String {
    const NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];
    field
        .split(',')
        .map(|part| {
            part.split('-')
                .map(|p| match p.parse::<usize>() {
                    Ok(n) if n <= 7 => NAMES[n % 7].to_string(),
                    _ => p.to_string(),
                })
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect::<Vec<_>>()
        .join(",")
}
