//! Engine events.
//!
//! One fixed-field variant per activity category, published on a broadcast
//! channel for whoever wants to observe the engine (audit trail, UI feed,
//! alerts). Publishing never blocks and never fails the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::SkipReason;
use crate::domain::filter::FilterRejection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    CommentResponded {
        monitor_id: String,
        comment_id: String,
        rule_id: Option<String>,
        message_id: String,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },
    DispatchFailed {
        monitor_id: String,
        comment_id: String,
        message: String,
        code: Option<String>,
        timestamp: DateTime<Utc>,
    },
    CommentFiltered {
        monitor_id: String,
        comment_id: String,
        reason: FilterRejection,
        timestamp: DateTime<Utc>,
    },
    RateLimited {
        monitor_id: String,
        comment_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    MonitorSkipped {
        monitor_id: String,
        reason: SkipReason,
        timestamp: DateTime<Utc>,
    },
    MonitorArchived {
        monitor_id: String,
        idle_days: i64,
        timestamp: DateTime<Utc>,
    },
    RecordsPruned {
        expired: u64,
        over_cap: u64,
        timestamp: DateTime<Utc>,
    },
    LoadAdjusted {
        rate_per_minute: u64,
        old_batch_size: usize,
        new_batch_size: usize,
        timestamp: DateTime<Utc>,
    },
    SystemPaused {
        rate_per_minute: u64,
        cooldown_secs: u64,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Monitor the event is about, if any.
    pub fn monitor_id(&self) -> Option<&str> {
        match self {
            Self::CommentResponded { monitor_id, .. }
            | Self::DispatchFailed { monitor_id, .. }
            | Self::CommentFiltered { monitor_id, .. }
            | Self::RateLimited { monitor_id, .. }
            | Self::MonitorSkipped { monitor_id, .. }
            | Self::MonitorArchived { monitor_id, .. } => Some(monitor_id),
            Self::RecordsPruned { .. } | Self::LoadAdjusted { .. } | Self::SystemPaused { .. } => {
                None
            }
        }
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            Self::CommentResponded {
                comment_id,
                latency_ms,
                ..
            } => format!("Replied to comment {} in {}ms", comment_id, latency_ms),
            Self::DispatchFailed {
                comment_id,
                message,
                ..
            } => format!("Reply to comment {} failed: {}", comment_id, message),
            Self::CommentFiltered {
                comment_id, reason, ..
            } => format!("Comment {} filtered ({})", comment_id, reason.as_str()),
            Self::RateLimited {
                comment_id, reason, ..
            } => format!("Comment {} deferred: {}", comment_id, reason),
            Self::MonitorSkipped {
                monitor_id, reason, ..
            } => format!("Monitor {} skipped: {}", monitor_id, reason),
            Self::MonitorArchived {
                monitor_id,
                idle_days,
                ..
            } => format!("Monitor {} archived after {} idle days", monitor_id, idle_days),
            Self::RecordsPruned {
                expired, over_cap, ..
            } => format!("Pruned {} expired and {} excess records", expired, over_cap),
            Self::LoadAdjusted {
                old_batch_size,
                new_batch_size,
                rate_per_minute,
                ..
            } => format!(
                "Batch size {} -> {} at {}/min",
                old_batch_size, new_batch_size, rate_per_minute
            ),
            Self::SystemPaused {
                rate_per_minute,
                cooldown_secs,
                ..
            } => format!(
                "Paused for {}s at {}/min",
                cooldown_secs, rate_per_minute
            ),
        }
    }
}

/// Broadcaster for engine events.
#[derive(Debug, Clone)]
pub struct EngineEventBroadcaster {
    sender: broadcast::Sender<EngineEvent>,
}

impl EngineEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EngineEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
