//! Structured results of a monitor pass.

use serde::{Deserialize, Serialize};

use crate::domain::filter::FilterRejection;

/// Why a monitor was not processed. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotFound,
    Inactive,
    Expired,
    QuotaExceeded,
    AlreadyRunning,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::QuotaExceeded => "quota_exceeded",
            Self::AlreadyRunning => "already_running",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one comment in a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    AlreadyProcessed,
    Filtered(FilterRejection),
    RateLimited,
    NoRuleMatched,
    Responded,
    DispatchFailed,
    Error(String),
}

/// Per-post tally of comment outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReport {
    pub post_id: String,
    pub comments_seen: usize,
    pub already_processed: usize,
    pub filtered: usize,
    pub rate_limited: usize,
    pub no_rule_matched: usize,
    pub responded: usize,
    pub failed: usize,
    pub errors: usize,
    /// Fetch error for this post, if the comments could not be listed.
    pub error: Option<String>,
}

impl PostReport {
    pub fn new(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &CommentOutcome) {
        self.comments_seen += 1;
        match outcome {
            CommentOutcome::AlreadyProcessed => self.already_processed += 1,
            CommentOutcome::Filtered(_) => self.filtered += 1,
            CommentOutcome::RateLimited => self.rate_limited += 1,
            CommentOutcome::NoRuleMatched => self.no_rule_matched += 1,
            CommentOutcome::Responded => self.responded += 1,
            CommentOutcome::DispatchFailed => self.failed += 1,
            CommentOutcome::Error(_) => self.errors += 1,
        }
    }
}

/// Result of `process_monitor`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub monitor_id: String,
    /// False only when the pass itself failed (e.g. the store was unreachable).
    pub success: bool,
    pub posts_processed: usize,
    pub per_post: Vec<PostReport>,
    pub skipped: Option<SkipReason>,
    pub error: Option<String>,
}

impl ProcessReport {
    pub fn skipped(monitor_id: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            success: true,
            skipped: Some(reason),
            ..Default::default()
        }
    }

    pub fn failed(monitor_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn responded(&self) -> usize {
        self.per_post.iter().map(|p| p.responded).sum()
    }

    pub fn dispatch_attempts(&self) -> usize {
        self.per_post.iter().map(|p| p.responded + p.failed).sum()
    }
}
