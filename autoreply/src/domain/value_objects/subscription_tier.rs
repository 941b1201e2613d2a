//! Owner subscription tier.

use serde::{Deserialize, Serialize};

/// Subscription level of a monitor owner. Determines how many monitors may
/// be active at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Basic,
    Premium,
    Business,
}

impl SubscriptionTier {
    /// Concurrently active monitors allowed.
    pub fn active_monitor_quota(&self) -> usize {
        match self {
            Self::Free => 2,
            Self::Basic => 3,
            Self::Premium => 5,
            Self::Business => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Basic => "BASIC",
            Self::Premium => "PREMIUM",
            Self::Business => "BUSINESS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FREE" => Some(Self::Free),
            "BASIC" => Some(Self::Basic),
            "PREMIUM" => Some(Self::Premium),
            "BUSINESS" => Some(Self::Business),
            _ => None,
        }
    }
}
