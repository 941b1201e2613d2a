//! Retention enforcement.
//!
//! Runs on its own timer alongside the processor:
//! - deletes response records past their TTL or the hard 7-day ceiling
//! - trims each monitor's records to its retention limit, oldest first
//! - deletes monitors past their absolute expiry, with their records
//! - archives monitors idle for longer than their auto-archive window
//!
//! Every limit is the lower of the monitor's setting and the system ceiling.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::clock::SharedClock;
use crate::database::repositories::{MonitorRepository, ResponseRepository};
use crate::domain::MonitorStatus;
use crate::limits;
use crate::monitor::{EngineEvent, EngineEventBroadcaster};

/// Configuration for the retention manager.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Interval between enforcement runs (default: 10 minutes).
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
        }
    }
}

/// What one enforcement run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub expired_records: u64,
    pub over_cap_records: u64,
    pub archived_monitors: Vec<String>,
    pub deleted_monitors: Vec<String>,
}

pub struct RetentionManager {
    monitors: Arc<dyn MonitorRepository>,
    responses: Arc<dyn ResponseRepository>,
    clock: SharedClock,
    events: EngineEventBroadcaster,
    config: RetentionConfig,
}

impl RetentionManager {
    pub fn new(
        monitors: Arc<dyn MonitorRepository>,
        responses: Arc<dyn ResponseRepository>,
        clock: SharedClock,
        events: EngineEventBroadcaster,
        config: RetentionConfig,
    ) -> Self {
        Self {
            monitors,
            responses,
            clock,
            events,
            config,
        }
    }

    /// Run all passes once. A failure on one monitor is logged and the run
    /// moves on to the next.
    pub async fn run_once(&self) -> Result<RetentionReport> {
        let now = self.clock.now();
        let mut report = RetentionReport {
            expired_records: self
                .responses
                .delete_expired(now, now - limits::response_ttl_max())
                .await?,
            ..Default::default()
        };

        for monitor in self.monitors.list_monitors().await? {
            if monitor.is_expired(now) {
                match self.delete_expired_monitor(&monitor.id).await {
                    Ok(records) => {
                        info!(monitor_id = %monitor.id, records, "Deleted expired monitor");
                        report.deleted_monitors.push(monitor.id);
                    }
                    Err(e) => {
                        warn!(monitor_id = %monitor.id, error = %e, "Deleting expired monitor failed")
                    }
                }
                continue;
            }

            let keep = u64::from(monitor.retention_limit());
            match self.responses.delete_oldest_beyond(&monitor.id, keep).await {
                Ok(trimmed) => {
                    if trimmed > 0 {
                        debug!(monitor_id = %monitor.id, trimmed, keep, "Trimmed response records");
                    }
                    report.over_cap_records += trimmed;
                }
                Err(e) => warn!(monitor_id = %monitor.id, error = %e, "Trimming records failed"),
            }

            if monitor.status == MonitorStatus::Archived {
                continue;
            }
            let idle = now - monitor.idle_since();
            if idle > monitor.archive_after() {
                match self
                    .monitors
                    .update_status(&monitor.id, MonitorStatus::Archived, now)
                    .await
                {
                    Ok(()) => {
                        info!(monitor_id = %monitor.id, idle_days = idle.num_days(), "Archived idle monitor");
                        self.events.publish(EngineEvent::MonitorArchived {
                            monitor_id: monitor.id.clone(),
                            idle_days: idle.num_days(),
                            timestamp: now,
                        });
                        report.archived_monitors.push(monitor.id);
                    }
                    Err(e) => warn!(monitor_id = %monitor.id, error = %e, "Archiving monitor failed"),
                }
            }
        }

        if report.expired_records > 0 || report.over_cap_records > 0 {
            info!(
                expired = report.expired_records,
                over_cap = report.over_cap_records,
                "Pruned response records"
            );
            self.events.publish(EngineEvent::RecordsPruned {
                expired: report.expired_records,
                over_cap: report.over_cap_records,
                timestamp: now,
            });
        }

        Ok(report)
    }

    async fn delete_expired_monitor(&self, monitor_id: &str) -> Result<u64> {
        let records = self.responses.delete_for_monitor(monitor_id).await?;
        self.monitors.delete_monitor(monitor_id).await?;
        Ok(records)
    }

    /// Enforce on every interval tick until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Retention manager stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Retention run failed");
                    }
                }
            }
        }
    }
}
