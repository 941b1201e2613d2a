//! Monitor lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle status of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorStatus {
    /// Polled by the scheduler.
    #[default]
    Active,
    /// Kept but not polled.
    Paused,
    /// Finished by its owner.
    Completed,
    /// Stopped after an unrecoverable failure.
    Failed,
    /// Retired after inactivity. Terminal.
    Archived,
}

impl MonitorStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "PAUSED" => Some(Self::Paused),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn can_transition_to(&self, target: MonitorStatus) -> bool {
        use MonitorStatus::*;

        if *self == target {
            return true;
        }

        match (self, target) {
            (Archived, _) => false,
            (_, Archived) => true,
            (Active, Paused | Completed | Failed) => true,
            (Paused | Completed | Failed, Active) => true,
            (Paused, Completed) => true,
            _ => false,
        }
    }

    pub fn transition_to(&self, target: MonitorStatus) -> Result<MonitorStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::validation(format!(
                "cannot transition monitor from {} to {}",
                self, target
            )))
        }
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archived_is_terminal() {
        assert!(!MonitorStatus::Archived.can_transition_to(MonitorStatus::Active));
        assert!(MonitorStatus::Archived.transition_to(MonitorStatus::Paused).is_err());
    }

    #[test]
    fn test_any_live_status_can_be_archived() {
        for status in [
            MonitorStatus::Active,
            MonitorStatus::Paused,
            MonitorStatus::Completed,
            MonitorStatus::Failed,
        ] {
            assert!(status.can_transition_to(MonitorStatus::Archived));
        }
    }
}
