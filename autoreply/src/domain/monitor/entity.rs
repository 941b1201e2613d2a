//! Monitor entity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::MonitorStatus;
use crate::domain::{AccessToken, Sentiment, SentimentTally};
use crate::limits;

/// Smoothing factor of the moving-average latency.
const LATENCY_SMOOTHING: f64 = 0.1;

/// A watched page and the policy used to answer comments on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub page_id: String,
    pub page_name: String,
    pub page_token: AccessToken,
    pub posts: PostSelection,
    /// Ordered rule references.
    pub rule_ids: Vec<String>,
    pub default_response: String,
    pub filters: FilterConfig,
    pub behavior: ResponseBehavior,
    pub rate_limit: RateLimitSettings,
    pub retention: RetentionSettings,
    pub status: MonitorStatus,
    pub stats: MonitorStats,
    pub last_error: Option<LastError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Which posts of the page are watched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostSelection {
    /// Watch the page's most recent posts instead of an explicit list.
    pub all_posts: bool,
    /// Explicit post list.
    pub posts: Vec<MonitoredPost>,
    /// Cap on posts processed per pass when `all_posts` is set.
    pub max_posts: usize,
}

impl PostSelection {
    /// Set the checkpoint of `post_id` if it is in the explicit list.
    pub fn mark_checked(&mut self, post_id: &str, at: DateTime<Utc>) {
        if let Some(post) = self.posts.iter_mut().find(|p| p.post_id == post_id) {
            post.last_checked_at = Some(at);
        }
    }
}

impl Default for PostSelection {
    fn default() -> Self {
        Self {
            all_posts: false,
            posts: Vec::new(),
            max_posts: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredPost {
    pub post_id: String,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl MonitoredPost {
    pub fn new(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            last_checked_at: None,
        }
    }
}

/// Monitor-level comment filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Authors never answered.
    pub excluded_user_ids: Vec<String>,
    /// When non-empty, at least one term must be present.
    pub must_contain: Vec<String>,
    /// None of these terms may be present.
    pub must_not_contain: Vec<String>,
    /// Minimum comment length in characters.
    pub min_length: usize,
    pub skip_spam: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_user_ids: Vec::new(),
            must_contain: Vec::new(),
            must_not_contain: Vec::new(),
            min_length: 0,
            skip_spam: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseBehavior {
    /// Answer with the default response when no rule matches.
    pub respond_to_all: bool,
    /// Also answer comments written before the monitor was created.
    pub reply_to_existing_comments: bool,
    pub sentiment_aware: bool,
    /// Random pick instead of sequential rotation.
    pub randomize: bool,
    /// Substitute `{comment}`, `{name}`, `{page}`, `{time}` and rule variables.
    pub custom_template: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_responses_per_hour: u32,
    pub min_seconds_between: u64,
    pub prioritize_newer: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_responses_per_hour: limits::MONITOR_RESPONSES_PER_HOUR,
            min_seconds_between: 30,
            prioritize_newer: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub max_stored_responses: u32,
    pub auto_archive_after_days: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_stored_responses: 500,
            auto_archive_after_days: 7,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorStats {
    pub comments_found: u64,
    pub responses_sent: u64,
    pub errors: u64,
    pub spam_detected: u64,
    pub sentiment: SentimentTally,
    pub avg_latency_ms: f64,
    pub last_response_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub message: String,
    pub code: Option<String>,
    pub at: DateTime<Utc>,
}

/// What a processing pass writes back: counters, the last error and
/// checkpoints. Status and owner configuration are not part of it, so a
/// status change or edit made while a pass runs is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorProgress {
    pub stats: MonitorStats,
    pub last_error: Option<LastError>,
    /// `(post_id, checked_at)` for each explicitly selected post.
    pub post_checks: Vec<(String, DateTime<Utc>)>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Create a new active monitor with default policy.
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        page_id: impl Into<String>,
        page_token: AccessToken,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            page_id: page_id.into(),
            page_name: String::new(),
            page_token,
            posts: PostSelection::default(),
            rule_ids: Vec::new(),
            default_response: String::new(),
            filters: FilterConfig::default(),
            behavior: ResponseBehavior::default(),
            rate_limit: RateLimitSettings::default(),
            retention: RetentionSettings::default(),
            status: MonitorStatus::Active,
            stats: MonitorStats::default(),
            last_error: None,
            created_at: now,
            updated_at: now,
            last_checked_at: None,
            expires_at: now + limits::monitor_expiry_max(),
        }
    }

    pub fn with_posts(mut self, post_ids: &[&str]) -> Self {
        self.posts.all_posts = false;
        self.posts.posts = post_ids.iter().map(|id| MonitoredPost::new(*id)).collect();
        self
    }

    pub fn with_rules(mut self, rule_ids: &[&str]) -> Self {
        self.rule_ids = rule_ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Clamp every numeric limit to the system ceilings. Applied on each write.
    pub fn enforce_limits(&mut self, now: DateTime<Utc>) {
        let rate = &mut self.rate_limit;
        rate.max_responses_per_hour = rate
            .max_responses_per_hour
            .min(limits::MONITOR_RESPONSES_PER_HOUR);
        rate.min_seconds_between = rate
            .min_seconds_between
            .max(limits::MIN_SECONDS_BETWEEN_RESPONSES);

        self.retention.max_stored_responses = self
            .retention
            .max_stored_responses
            .min(limits::MAX_STORED_RESPONSES);
        self.retention.auto_archive_after_days = self
            .retention
            .auto_archive_after_days
            .min(limits::AUTO_ARCHIVE_DAYS_MAX);

        self.posts.max_posts = self.posts.max_posts.min(limits::MAX_POSTS_PER_MONITOR);
        self.posts.posts.truncate(limits::MAX_POSTS_PER_MONITOR);

        let mut seen = std::collections::HashSet::new();
        self.rule_ids.retain(|id| seen.insert(id.clone()));
        self.rule_ids.truncate(limits::MAX_RULES_PER_MONITOR);

        let latest_expiry = now + limits::monitor_expiry_max();
        if self.expires_at > latest_expiry {
            self.expires_at = latest_expiry;
        }
    }

    /// Hourly reply cap after applying the system ceiling.
    pub fn hourly_cap(&self) -> u32 {
        self.rate_limit
            .max_responses_per_hour
            .min(limits::MONITOR_RESPONSES_PER_HOUR)
    }

    /// Spacing between replies after applying the system floor.
    pub fn min_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.rate_limit
                .min_seconds_between
                .max(limits::MIN_SECONDS_BETWEEN_RESPONSES),
        )
    }

    pub fn retention_limit(&self) -> u32 {
        self.retention
            .max_stored_responses
            .min(limits::MAX_STORED_RESPONSES)
    }

    pub fn archive_after(&self) -> Duration {
        Duration::days(
            self.retention
                .auto_archive_after_days
                .min(limits::AUTO_ARCHIVE_DAYS_MAX) as i64,
        )
    }

    /// Post processing cap for one pass.
    pub fn post_cap(&self) -> usize {
        self.posts.max_posts.clamp(1, limits::MAX_POSTS_PER_MONITOR)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Reference point for inactivity-based archival.
    pub fn idle_since(&self) -> DateTime<Utc> {
        self.last_checked_at.unwrap_or(self.created_at)
    }

    pub fn record_comment_found(&mut self) {
        self.stats.comments_found += 1;
    }

    pub fn record_spam(&mut self) {
        self.stats.spam_detected += 1;
    }

    /// Account for one dispatch attempt.
    pub fn record_response(
        &mut self,
        success: bool,
        latency_ms: u64,
        sentiment: Sentiment,
        now: DateTime<Utc>,
    ) {
        let samples = self.stats.responses_sent + self.stats.errors;
        self.stats.avg_latency_ms = if samples == 0 {
            latency_ms as f64
        } else {
            self.stats.avg_latency_ms * (1.0 - LATENCY_SMOOTHING)
                + latency_ms as f64 * LATENCY_SMOOTHING
        };

        if success {
            self.stats.responses_sent += 1;
            self.stats.sentiment.record(sentiment);
            self.stats.last_response_at = Some(now);
        } else {
            self.stats.errors += 1;
        }
    }

    pub fn record_error(
        &mut self,
        message: impl Into<String>,
        code: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.stats.errors += 1;
        self.set_last_error(message, code, now);
    }

    pub fn set_last_error(
        &mut self,
        message: impl Into<String>,
        code: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.last_error = Some(LastError {
            message: message.into(),
            code,
            at: now,
        });
    }

    pub fn mark_post_checked(&mut self, post_id: &str, now: DateTime<Utc>) {
        self.posts.mark_checked(post_id, now);
    }

    pub fn progress(&self) -> MonitorProgress {
        MonitorProgress {
            stats: self.stats.clone(),
            last_error: self.last_error.clone(),
            post_checks: self
                .posts
                .posts
                .iter()
                .filter_map(|p| p.last_checked_at.map(|at| (p.post_id.clone(), at)))
                .collect(),
            last_checked_at: self.last_checked_at,
            updated_at: self.updated_at,
        }
    }

    /// Merge pass progress into this (stored) monitor. Posts removed from
    /// the selection in the meantime are ignored.
    pub fn apply_progress(&mut self, progress: &MonitorProgress) {
        self.stats = progress.stats.clone();
        self.last_error = progress.last_error.clone();
        for (post_id, at) in &progress.post_checks {
            self.posts.mark_checked(post_id, *at);
        }
        if progress.last_checked_at.is_some() {
            self.last_checked_at = progress.last_checked_at;
        }
        self.updated_at = progress.updated_at;
    }
}
