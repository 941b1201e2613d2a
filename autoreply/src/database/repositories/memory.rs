//! In-memory repositories.
//!
//! Same contracts as the SQLite repositories, including the
//! `(monitor_id, comment_id)` uniqueness of response records.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{MonitorRepository, ResponseRepository, RuleRepository};
use crate::domain::monitor::MonitorProgress;
use crate::domain::rule::RuleStats;
use crate::domain::{Monitor, MonitorStatus, ResponseRecord, Rule};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryMonitorRepository {
    monitors: RwLock<HashMap<String, Monitor>>,
}

impl MemoryMonitorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted(mut monitors: Vec<Monitor>) -> Vec<Monitor> {
    monitors.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    monitors
}

#[async_trait]
impl MonitorRepository for MemoryMonitorRepository {
    async fn find_monitor(&self, id: &str) -> Result<Option<Monitor>> {
        Ok(self.monitors.read().get(id).cloned())
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>> {
        Ok(sorted(self.monitors.read().values().cloned().collect()))
    }

    async fn list_by_status(&self, status: MonitorStatus) -> Result<Vec<Monitor>> {
        Ok(sorted(
            self.monitors
                .read()
                .values()
                .filter(|m| m.status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Monitor>> {
        Ok(sorted(
            self.monitors
                .read()
                .values()
                .filter(|m| m.owner_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn count_by_owner_and_status(&self, owner_id: &str, status: MonitorStatus) -> Result<u64> {
        Ok(self
            .monitors
            .read()
            .values()
            .filter(|m| m.owner_id == owner_id && m.status == status)
            .count() as u64)
    }

    async fn create_monitor(&self, monitor: &Monitor) -> Result<()> {
        let mut monitors = self.monitors.write();
        if monitors.contains_key(&monitor.id) {
            return Err(Error::conflict(format!("monitor {} already exists", monitor.id)));
        }
        monitors.insert(monitor.id.clone(), monitor.clone());
        Ok(())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<()> {
        match self.monitors.write().get_mut(&monitor.id) {
            Some(stored) => {
                *stored = monitor.clone();
                Ok(())
            }
            None => Err(Error::not_found("Monitor", &monitor.id)),
        }
    }

    async fn update_progress(&self, id: &str, progress: &MonitorProgress) -> Result<()> {
        match self.monitors.write().get_mut(id) {
            Some(stored) => {
                stored.apply_progress(progress);
                Ok(())
            }
            None => Err(Error::not_found("Monitor", id)),
        }
    }

    async fn update_status(&self, id: &str, status: MonitorStatus, now: DateTime<Utc>) -> Result<()> {
        match self.monitors.write().get_mut(id) {
            Some(stored) => {
                stored.status = status;
                stored.updated_at = now;
                Ok(())
            }
            None => Err(Error::not_found("Monitor", id)),
        }
    }

    async fn delete_monitor(&self, id: &str) -> Result<()> {
        self.monitors.write().remove(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRuleRepository {
    rules: RwLock<HashMap<String, Rule>>,
}

impl MemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleRepository for MemoryRuleRepository {
    async fn find_rule(&self, id: &str) -> Result<Option<Rule>> {
        Ok(self.rules.read().get(id).cloned())
    }

    async fn get_rules(&self, ids: &[String]) -> Result<Vec<Rule>> {
        let rules = self.rules.read();
        Ok(ids.iter().filter_map(|id| rules.get(id).cloned()).collect())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .rules
            .read()
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(rules)
    }

    async fn create_rule(&self, rule: &Rule) -> Result<()> {
        let mut rules = self.rules.write();
        if rules.contains_key(&rule.id) {
            return Err(Error::conflict(format!("rule {} already exists", rule.id)));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn update_rule(&self, rule: &Rule) -> Result<()> {
        match self.rules.write().get_mut(&rule.id) {
            Some(stored) => {
                *stored = rule.clone();
                Ok(())
            }
            None => Err(Error::not_found("Rule", &rule.id)),
        }
    }

    async fn delete_rule(&self, id: &str) -> Result<()> {
        self.rules.write().remove(id);
        Ok(())
    }

    async fn update_rotation(&self, id: &str, cursor: usize, now: DateTime<Utc>) -> Result<()> {
        if let Some(rule) = self.rules.write().get_mut(id) {
            rule.rotation_cursor = cursor;
            rule.updated_at = now;
        }
        Ok(())
    }

    async fn update_stats(&self, id: &str, stats: &RuleStats, now: DateTime<Utc>) -> Result<()> {
        if let Some(rule) = self.rules.write().get_mut(id) {
            rule.stats = stats.clone();
            rule.updated_at = now;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryResponseRepository {
    /// Keyed by `(monitor_id, comment_id)`.
    records: RwLock<HashMap<(String, String), ResponseRecord>>,
    seen: RwLock<HashSet<(String, String)>>,
}

impl MemoryResponseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn all(&self) -> Vec<ResponseRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

#[async_trait]
impl ResponseRepository for MemoryResponseRepository {
    async fn exists(&self, monitor_id: &str, comment_id: &str) -> Result<bool> {
        Ok(self
            .records
            .read()
            .contains_key(&(monitor_id.to_string(), comment_id.to_string())))
    }

    async fn insert(&self, record: &ResponseRecord) -> Result<()> {
        let key = (record.monitor_id.clone(), record.comment_id.clone());
        let mut records = self.records.write();
        if records.contains_key(&key) {
            return Err(Error::conflict(format!(
                "comment {} already has a response under monitor {}",
                record.comment_id, record.monitor_id
            )));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn mark_seen(&self, monitor_id: &str, comment_id: &str, _now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .seen
            .write()
            .insert((monitor_id.to_string(), comment_id.to_string())))
    }

    async fn list_for_monitor(&self, monitor_id: &str, limit: u32) -> Result<Vec<ResponseRecord>> {
        let mut records: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| r.monitor_id == monitor_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn count_for_monitor(&self, monitor_id: &str) -> Result<u64> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.monitor_id == monitor_id)
            .count() as u64)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.created_at >= since)
            .count() as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>, created_before: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.expires_at > now && r.created_at >= created_before);
        Ok((before - records.len()) as u64)
    }

    async fn delete_oldest_beyond(&self, monitor_id: &str, keep: u64) -> Result<u64> {
        let mut records = self.records.write();
        let mut owned: Vec<_> = records
            .iter()
            .filter(|(_, r)| r.monitor_id == monitor_id)
            .map(|(key, r)| (r.created_at, r.id.clone(), key.clone()))
            .collect();
        let keep = keep.min(usize::MAX as u64) as usize;
        if owned.len() <= keep {
            return Ok(0);
        }
        owned.sort();
        let excess = owned.len() - keep;
        for (_, _, key) in owned.into_iter().take(excess) {
            records.remove(&key);
        }
        Ok(excess as u64)
    }

    async fn delete_for_monitor(&self, monitor_id: &str) -> Result<u64> {
        self.seen.write().retain(|(m, _)| m != monitor_id);
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.monitor_id != monitor_id);
        Ok((before - records.len()) as u64)
    }
}
