//! Service configuration.
//!
//! Every setting has a default and can be overridden through the environment
//! (a `.env` file is loaded first by the binary). Values that fail to parse
//! are ignored. The hard ceilings in [`crate::limits`] are not configurable.

use std::str::FromStr;
use std::time::Duration;

use graph_api::GraphClientConfig;
use tracing::warn;

use crate::domain::SubscriptionTier;
use crate::governor::{BATCH_SIZE_DEFAULT, LoadMonitorConfig};
use crate::monitor::ProcessorConfig;
use crate::retention::RetentionConfig;
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub log_dir: String,
    /// Initial batch size; the load monitor adjusts it at runtime.
    pub batch_size: usize,
    /// Tier assumed for owners without a stored subscription.
    pub default_tier: SubscriptionTier,
    pub graph: GraphClientConfig,
    pub processor: ProcessorConfig,
    pub scheduler: SchedulerConfig,
    pub load_monitor: LoadMonitorConfig,
    pub retention: RetentionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:autoreply.db?mode=rwc".to_string(),
            log_dir: "logs".to_string(),
            batch_size: BATCH_SIZE_DEFAULT,
            default_tier: SubscriptionTier::Free,
            graph: GraphClientConfig::default(),
            processor: ProcessorConfig::default(),
            scheduler: SchedulerConfig::default(),
            load_monitor: LoadMonitorConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `DATABASE_URL`, `LOG_DIR`
    /// - `GRAPH_API_BASE_URL`, `GRAPH_API_TIMEOUT_SECS`
    /// - `SCHEDULER_TICK_SECS`, `LOAD_MONITOR_TICK_SECS`, `RETENTION_TICK_SECS`
    /// - `COMMENT_PAUSE_MS`, `MONITOR_PAUSE_MS`
    /// - `BATCH_SIZE`, `RESPONSE_TTL_DAYS`, `DEFAULT_SUBSCRIPTION_TIER`
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL")
            && !url.trim().is_empty()
        {
            config.database_url = url;
        }
        if let Some(dir) = lookup("LOG_DIR")
            && !dir.trim().is_empty()
        {
            config.log_dir = dir;
        }
        if let Some(base_url) = lookup("GRAPH_API_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config.graph.base_url = base_url;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "GRAPH_API_TIMEOUT_SECS") {
            let timeout = Duration::from_secs(secs.max(1));
            config.graph.request_timeout = timeout;
            config.processor.fetch_timeout = timeout;
            config.processor.dispatch_timeout = timeout;
        }
        if let Some(secs) = parsed::<u64>(&lookup, "SCHEDULER_TICK_SECS") {
            config.scheduler.tick = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parsed::<u64>(&lookup, "LOAD_MONITOR_TICK_SECS") {
            config.load_monitor.interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parsed::<u64>(&lookup, "RETENTION_TICK_SECS") {
            config.retention.interval = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = parsed::<u64>(&lookup, "COMMENT_PAUSE_MS") {
            config.processor.comment_pause = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>(&lookup, "MONITOR_PAUSE_MS") {
            config.scheduler.monitor_pause = Duration::from_millis(ms);
        }
        if let Some(size) = parsed::<usize>(&lookup, "BATCH_SIZE") {
            config.batch_size = size;
        }
        if let Some(days) = parsed::<i64>(&lookup, "RESPONSE_TTL_DAYS") {
            config.processor.response_ttl_days = days;
        }
        if let Some(tier) = lookup("DEFAULT_SUBSCRIPTION_TIER") {
            match SubscriptionTier::parse(tier.trim()) {
                Some(tier) => config.default_tier = tier,
                None => warn!(value = %tier, "Unknown DEFAULT_SUBSCRIPTION_TIER, using default"),
            }
        }

        config
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}
