//! Rule scheduling window.

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Days and time-of-day range during which a rule is live.
/// Supports overnight ranges (e.g., 22:00 - 02:00).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleWindow {
    /// A disabled window never restricts the rule.
    pub enabled: bool,
    /// Allowed days ("Monday", "mon", ...). Empty means every day.
    pub days_of_week: Vec<String>,
    /// Start time in HH:MM format.
    pub start_time: Option<String>,
    /// End time in HH:MM format.
    pub end_time: Option<String>,
    /// IANA timezone name, UTC when unset.
    pub timezone: Option<String>,
}

impl ScheduleWindow {
    pub fn new(days: Vec<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            enabled: true,
            days_of_week: days,
            start_time: Some(start.into()),
            end_time: Some(end.into()),
            timezone: None,
        }
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = Some(tz.into());
        self
    }

    /// Whether `now` falls inside the window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }

        let tz = self.resolve_timezone();
        let local = now.with_timezone(&tz);
        let weekday = local.weekday();
        // Bounds are whole minutes, so compare minute-of-day.
        let current = local.hour() * 60 + local.minute();

        let range = match (self.start_time.as_deref(), self.end_time.as_deref()) {
            (None, None) => None,
            (start, end) => {
                let start = start.map_or(Some(0), parse_minute_of_day);
                let end = end.map_or(Some(LAST_MINUTE), parse_minute_of_day);
                match (start, end) {
                    (Some(s), Some(e)) => Some((s, e)),
                    // Unparseable bounds close the window.
                    _ => return false,
                }
            }
        };

        let Some((start, end)) = range else {
            return self.allows_day(weekday);
        };

        if start <= end {
            return self.allows_day(weekday) && current >= start && current <= end;
        }

        // Overnight: the late part belongs to the current day, the early part
        // to the previous day.
        if current >= start {
            self.allows_day(weekday)
        } else if current <= end {
            self.allows_day(weekday.pred())
        } else {
            false
        }
    }

    fn allows_day(&self, weekday: Weekday) -> bool {
        self.days_of_week.is_empty()
            || self
                .days_of_week
                .iter()
                .filter_map(|d| d.trim().parse::<Weekday>().ok())
                .any(|d| d == weekday)
    }

    fn resolve_timezone(&self) -> Tz {
        match self.timezone.as_deref() {
            None | Some("") => Tz::UTC,
            Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                warn!(timezone = name, "Unknown schedule timezone, using UTC");
                Tz::UTC
            }),
        }
    }
}

const LAST_MINUTE: u32 = 23 * 60 + 59;

fn parse_minute_of_day(s: &str) -> Option<u32> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .ok()
        .map(|t| t.hour() * 60 + t.minute())
}
