//! System-wide hard ceilings.
//!
//! User configuration can tighten these, never relax them. Every persisted
//! monitor is clamped against them on write, and every runtime check uses
//! `min(configured, ceiling)` again.

use chrono::Duration;

/// Dispatches allowed across the whole process per rolling minute.
pub const GLOBAL_RESPONSES_PER_MINUTE: usize = 60;

/// Dispatches allowed per monitor per rolling hour.
pub const MONITOR_RESPONSES_PER_HOUR: u32 = 30;

/// Dispatches allowed per owner, across all monitors, per rolling hour.
pub const OWNER_RESPONSES_PER_HOUR: usize = 50;

/// Minimum spacing between two successful replies of the same monitor.
pub const MIN_SECONDS_BETWEEN_RESPONSES: u64 = 10;

/// Posts watched per monitor.
pub const MAX_POSTS_PER_MONITOR: usize = 50;

/// Rules referenced by a monitor.
pub const MAX_RULES_PER_MONITOR: usize = 10;

/// Response records kept per monitor.
pub const MAX_STORED_RESPONSES: u32 = 1000;

/// Hard TTL of a response record.
pub const RESPONSE_TTL_DAYS_MAX: i64 = 7;

/// TTL used when no other is configured.
pub const RESPONSE_TTL_DAYS_DEFAULT: i64 = 3;

/// Absolute lifetime of a monitor.
pub const MONITOR_EXPIRY_DAYS_MAX: i64 = 30;

/// Inactivity before a monitor is archived.
pub const AUTO_ARCHIVE_DAYS_MAX: u32 = 14;

/// Maximum reply length in characters.
pub const MAX_RESPONSE_CHARS: usize = 500;

pub fn response_ttl(configured_days: i64) -> Duration {
    Duration::days(configured_days.clamp(1, RESPONSE_TTL_DAYS_MAX))
}

pub fn response_ttl_max() -> Duration {
    Duration::days(RESPONSE_TTL_DAYS_MAX)
}

pub fn monitor_expiry_max() -> Duration {
    Duration::days(MONITOR_EXPIRY_DAYS_MAX)
}
