//! Response audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Sentiment;

/// Structured failure of a reply dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchError {
    pub message: String,
    pub code: Option<String>,
}

impl DispatchError {
    pub fn new(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent { message_id: String },
    Failed(DispatchError),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Sent { message_id } => Some(message_id),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            Self::Sent { .. } => None,
            Self::Failed(e) => Some(e),
        }
    }
}

/// Immutable audit of one comment-response attempt.
///
/// At most one record exists per `(monitor_id, comment_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: String,
    pub monitor_id: String,
    pub owner_id: String,
    pub rule_id: Option<String>,
    pub page_id: String,
    pub post_id: String,
    pub comment_id: String,
    pub comment_text: String,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub sentiment: Sentiment,
    pub is_spam: bool,
    pub response_text: String,
    pub outcome: DispatchOutcome,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ResponseRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }
}
