//! Adaptive load shedding.
//!
//! Measures the system-wide reply rate from the response store and tunes the
//! scheduler batch size, raising the global pause flag when the rate runs far
//! above the global ceiling.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::service::{BATCH_SIZE_MAX, BATCH_SIZE_MIN, RateGovernor};
use crate::Result;
use crate::clock::SharedClock;
use crate::database::repositories::ResponseRepository;
use crate::limits::GLOBAL_RESPONSES_PER_MINUTE;
use crate::monitor::{EngineEvent, EngineEventBroadcaster};

/// Rate above this share of the cap (percent) pauses the system.
const PAUSE_THRESHOLD_PCT: u64 = 150;
/// Rate above this share of the cap shrinks the batch.
const SHRINK_THRESHOLD_PCT: u64 = 80;
/// Rate below this share of the cap grows the batch.
const GROW_THRESHOLD_PCT: u64 = 50;
const GROW_STEP: usize = 2;

#[derive(Debug, Clone)]
pub struct LoadMonitorConfig {
    /// Interval between measurements (default: 60s).
    pub interval: Duration,
    /// Lookback of a measurement (default: 60s).
    pub window: Duration,
    /// Pause length once the rate exceeds the pause threshold (default: 5 minutes).
    pub cooldown: Duration,
}

impl Default for LoadMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(5 * 60),
        }
    }
}

/// Decision taken by one measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDecision {
    Paused { rate: u64 },
    Shrunk { rate: u64, batch_size: usize },
    Grown { rate: u64, batch_size: usize },
    Steady { rate: u64, batch_size: usize },
}

pub struct LoadMonitor {
    responses: Arc<dyn ResponseRepository>,
    governor: RateGovernor,
    clock: SharedClock,
    events: EngineEventBroadcaster,
    config: LoadMonitorConfig,
}

impl LoadMonitor {
    pub fn new(
        responses: Arc<dyn ResponseRepository>,
        governor: RateGovernor,
        clock: SharedClock,
        events: EngineEventBroadcaster,
        config: LoadMonitorConfig,
    ) -> Self {
        Self {
            responses,
            governor,
            clock,
            events,
            config,
        }
    }

    /// Take one measurement and apply the resulting adjustment.
    pub async fn check(&self) -> Result<LoadDecision> {
        let now = self.clock.now();
        let since = now - chrono::Duration::from_std(self.config.window).unwrap_or_default();
        let recent = self.responses.count_created_since(since).await?;

        // Normalize to a per-minute rate.
        let window_secs = self.config.window.as_secs().max(1);
        let rate = recent * 60 / window_secs;
        let cap = GLOBAL_RESPONSES_PER_MINUTE as u64;
        let current = self.governor.batch_size();

        self.governor.compact();

        if rate * 100 > cap * PAUSE_THRESHOLD_PCT {
            warn!(rate, cap, "Reply rate far above the global cap, pausing");
            self.governor.pause_for(self.config.cooldown);
            let new = self.governor.set_batch_size(BATCH_SIZE_MIN);
            self.events.publish(EngineEvent::SystemPaused {
                rate_per_minute: rate,
                cooldown_secs: self.config.cooldown.as_secs(),
                timestamp: now,
            });
            self.publish_adjustment(rate, current, new, now);
            return Ok(LoadDecision::Paused { rate });
        }

        let decision = if rate * 100 > cap * SHRINK_THRESHOLD_PCT {
            let new = self.governor.set_batch_size((current / 2).max(BATCH_SIZE_MIN));
            LoadDecision::Shrunk {
                rate,
                batch_size: new,
            }
        } else if rate * 100 < cap * GROW_THRESHOLD_PCT {
            let new = self
                .governor
                .set_batch_size((current + GROW_STEP).min(BATCH_SIZE_MAX));
            LoadDecision::Grown {
                rate,
                batch_size: new,
            }
        } else {
            LoadDecision::Steady {
                rate,
                batch_size: current,
            }
        };

        match decision {
            LoadDecision::Shrunk { batch_size, .. } | LoadDecision::Grown { batch_size, .. } => {
                self.publish_adjustment(rate, current, batch_size, now);
            }
            _ => {}
        }
        debug!(rate, ?decision, "Load measured");
        Ok(decision)
    }

    fn publish_adjustment(
        &self,
        rate: u64,
        old: usize,
        new: usize,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        if old == new {
            return;
        }
        info!(rate, old, new, "Batch size adjusted");
        self.events.publish(EngineEvent::LoadAdjusted {
            rate_per_minute: rate,
            old_batch_size: old,
            new_batch_size: new,
            timestamp: now,
        });
    }

    /// Measure on every interval tick until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Load monitor stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.check().await {
                        error!(error = %e, "Load measurement failed");
                    }
                }
            }
        }
    }
}
