//! Recurrence rules: weekday/time parsing and next-fire computation.
//!
//! Weekdays are encoded 0 (Monday) .. 6 (Sunday). Fire instants are derived
//! from the civil calendar of a fixed timezone, so a DST transition shifts
//! the absolute UTC instant but never the local fire time.

use chrono::offset::LocalResult;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Display names, indexed by weekday number.
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Pazartesi",
    "Salı",
    "Çarşamba",
    "Perşembe",
    "Cuma",
    "Cumartesi",
    "Pazar",
];

/// Wall-clock time of day in the schedule's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Weekly recurrence pattern. Immutable once committed.
///
/// `weekdays` is non-empty, deduplicated and sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub weekdays: Vec<u8>,
    pub time: TimeOfDay,
}

impl ScheduleSpec {
    /// Human-readable weekday list for confirmation/preview texts,
    /// e.g. "Pazartesi, Çarşamba".
    pub fn weekday_names(&self) -> String {
        self.weekdays
            .iter()
            .filter_map(|&d| WEEKDAY_NAMES.get(d as usize).copied())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Accepted spellings per weekday: Turkish full name, Turkish 3-letter
/// abbreviation, and the English name. Lowercased lookup.
fn weekday_index(token: &str) -> Option<u8> {
    match token {
        "pazartesi" | "pzt" | "monday" => Some(0),
        "salı" | "sal" | "tuesday" => Some(1),
        "çarşamba" | "çar" | "wednesday" => Some(2),
        "perşembe" | "per" | "thursday" => Some(3),
        "cuma" | "cum" | "friday" => Some(4),
        "cumartesi" | "cmt" | "saturday" => Some(5),
        "pazar" | "paz" | "sunday" => Some(6),
        _ => None,
    }
}

/// Parse a comma-separated weekday list into the canonical sorted set.
///
/// Any unmapped token fails the whole parse; there is no partial acceptance.
pub fn parse_weekdays(input: &str) -> Result<Vec<u8>, DomainError> {
    let mut days = Vec::new();
    for token in input.split(',') {
        let trimmed = token.trim();
        match weekday_index(&trimmed.to_lowercase()) {
            Some(day) => days.push(day),
            None => return Err(DomainError::InvalidWeekday(trimmed.to_string())),
        }
    }
    days.sort_unstable();
    days.dedup();
    Ok(days)
}

/// Parse a strict `HH:MM` time of day (ISO local-time subset).
pub fn parse_time_of_day(input: &str) -> Result<TimeOfDay, DomainError> {
    let trimmed = input.trim();
    let (h, m) = trimmed.split_once(':').ok_or(DomainError::InvalidTimeFormat)?;
    if h.len() != 2 || m.len() != 2 || !is_digits(h) || !is_digits(m) {
        return Err(DomainError::InvalidTimeFormat);
    }
    let hour: u8 = h.parse().map_err(|_| DomainError::InvalidTimeFormat)?;
    let minute: u8 = m.parse().map_err(|_| DomainError::InvalidTimeFormat)?;
    if hour > 23 || minute > 59 {
        return Err(DomainError::InvalidTimeFormat);
    }
    Ok(TimeOfDay { hour, minute })
}

fn is_digits(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_digit())
}

/// Soonest instant at or after `now` whose local weekday is in the set and
/// whose local time equals the schedule's time of day.
///
/// `now` is truncated to the minute first, so an exact weekday+HH:MM match
/// of "now" counts as due rather than being pushed a week out. Returns None
/// only for an empty weekday set (excluded by construction) or a local time
/// the calendar cannot resolve within the search horizon.
pub fn next_fire_instant(spec: &ScheduleSpec, tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let floor = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    let local_today = now.with_timezone(&tz).date_naive();

    // Two weeks covers every weekday even across DST gaps.
    for day_offset in 0..=14 {
        let date = local_today + Duration::days(day_offset);
        let weekday = date.weekday().num_days_from_monday() as u8;
        if !spec.weekdays.contains(&weekday) {
            continue;
        }
        if let Some(instant) = resolve_local(tz, date, spec.time) {
            if instant >= floor {
                return Some(instant);
            }
        }
    }
    None
}

/// Map a civil date + wall-clock time to a UTC instant.
///
/// Ambiguous local times (fall-back) resolve to the earlier instant. Local
/// times skipped by a spring-forward gap resolve to the first valid
/// wall-clock time after the gap.
fn resolve_local(tz: Tz, date: NaiveDate, time: TimeOfDay) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(time.hour as u32, time.minute as u32, 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => Some(t.with_timezone(&Utc)),
        LocalResult::None => (1..=3).find_map(|hours| {
            match tz.from_local_datetime(&(naive + Duration::hours(hours))) {
                LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => {
                    Some(t.with_timezone(&Utc))
                }
                LocalResult::None => None,
            }
        }),
    }
}
