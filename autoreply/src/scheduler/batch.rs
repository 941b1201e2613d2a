use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Result;
use crate::database::repositories::MonitorRepository;
use crate::domain::{Monitor, MonitorStatus};
use crate::monitor::{MonitorProcessor, ProcessReport};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between batch passes (default: 60s).
    pub tick: Duration,
    /// Pause between two monitors of a batch (default: 2s).
    pub monitor_pause: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            monitor_pause: Duration::from_secs(2),
        }
    }
}

/// Result of one `run_batch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// A previous batch was still in progress.
    AlreadyRunning,
    /// The system was paused before any monitor was started.
    Paused,
    /// Reports of the monitors processed, in order. The batch may have been
    /// cut short by a pause.
    Completed { reports: Vec<ProcessReport> },
}

pub struct BatchScheduler {
    monitors: Arc<dyn MonitorRepository>,
    processor: Arc<MonitorProcessor>,
    config: SchedulerConfig,
    running: AtomicBool,
}

/// Resets the single-flight flag when a batch ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchScheduler {
    pub fn new(
        monitors: Arc<dyn MonitorRepository>,
        processor: Arc<MonitorProcessor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            monitors,
            processor,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one batch pass unless one is already in progress.
    pub async fn run_batch(&self) -> Result<BatchOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Batch already in progress, skipping tick");
            return Ok(BatchOutcome::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let governor = self.processor.governor();
        if governor.is_paused() {
            info!("System paused, skipping batch");
            return Ok(BatchOutcome::Paused);
        }

        let active = self.monitors.list_by_status(MonitorStatus::Active).await?;
        let batch = select_batch(active, governor.batch_size());
        debug!(monitors = batch.len(), "Starting batch");

        let mut reports = Vec::with_capacity(batch.len());
        for (index, monitor_id) in batch.iter().enumerate() {
            if governor.is_paused() {
                info!(remaining = batch.len() - index, "System paused, abandoning batch");
                break;
            }
            if index > 0 && !self.config.monitor_pause.is_zero() {
                tokio::time::sleep(self.config.monitor_pause).await;
            }
            reports.push(self.processor.process_monitor(monitor_id).await);
        }

        info!(
            processed = reports.len(),
            responded = reports.iter().map(ProcessReport::responded).sum::<usize>(),
            "Batch completed"
        );
        Ok(BatchOutcome::Completed { reports })
    }

    /// Run a batch on every tick until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Batch scheduler stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_batch().await {
                        error!(error = %e, "Batch pass failed");
                    }
                }
            }
        }
    }
}

/// Least-recently-checked first; never-checked monitors lead.
fn select_batch(mut monitors: Vec<Monitor>, batch_size: usize) -> Vec<String> {
    monitors.sort_by_key(|m| m.last_checked_at);
    monitors
        .into_iter()
        .take(batch_size)
        .map(|m| m.id)
        .collect()
}
