//! Owner-facing monitor and rule management.
//!
//! Monitors reference rules by id. The catalog keeps that association
//! consistent: a monitor may only reference existing rules of its own owner,
//! and a rule cannot be deleted while an active monitor still uses it.

use std::collections::HashSet;

use tracing::info;

use crate::clock::SharedClock;
use crate::database::repositories::Repositories;
use crate::domain::{MatchMode, Monitor, MonitorStatus, Rule};
use crate::{Error, Result, limits};

pub struct Catalog {
    repos: Repositories,
    clock: SharedClock,
}

impl Catalog {
    pub fn new(repos: Repositories, clock: SharedClock) -> Self {
        Self { repos, clock }
    }

    pub async fn create_monitor(&self, mut monitor: Monitor) -> Result<Monitor> {
        self.validate_monitor(&monitor).await?;
        let now = self.clock.now();
        monitor.created_at = now;
        monitor.updated_at = now;
        monitor.enforce_limits(now);

        self.repos.monitors.create_monitor(&monitor).await?;
        info!(monitor_id = %monitor.id, owner_id = %monitor.owner_id, "Monitor created");
        Ok(monitor)
    }

    /// Replace a monitor's configuration. Statistics and lifecycle fields
    /// are kept from the stored monitor.
    pub async fn update_monitor(&self, mut monitor: Monitor) -> Result<Monitor> {
        let stored = self.owned_monitor(&monitor.owner_id, &monitor.id).await?;
        self.validate_monitor(&monitor).await?;

        let now = self.clock.now();
        monitor.status = stored.status;
        monitor.stats = stored.stats;
        monitor.last_error = stored.last_error;
        monitor.last_checked_at = stored.last_checked_at;
        monitor.created_at = stored.created_at;
        monitor.updated_at = now;
        monitor.enforce_limits(stored.created_at);

        self.repos.monitors.update_monitor(&monitor).await?;
        Ok(monitor)
    }

    /// Delete a monitor together with its response records.
    pub async fn delete_monitor(&self, owner_id: &str, monitor_id: &str) -> Result<()> {
        self.owned_monitor(owner_id, monitor_id).await?;
        let records = self.repos.responses.delete_for_monitor(monitor_id).await?;
        self.repos.monitors.delete_monitor(monitor_id).await?;
        info!(monitor_id, records, "Monitor deleted");
        Ok(())
    }

    pub async fn set_monitor_status(
        &self,
        owner_id: &str,
        monitor_id: &str,
        status: MonitorStatus,
    ) -> Result<MonitorStatus> {
        let monitor = self.owned_monitor(owner_id, monitor_id).await?;
        let next = monitor.status.transition_to(status)?;
        if next == MonitorStatus::Active && monitor.is_expired(self.clock.now()) {
            return Err(Error::validation(format!(
                "monitor {} has expired and cannot be resumed",
                monitor_id
            )));
        }
        self.repos
            .monitors
            .update_status(monitor_id, next, self.clock.now())
            .await?;
        info!(monitor_id, from = %monitor.status, to = %next, "Monitor status changed");
        Ok(next)
    }

    pub async fn create_rule(&self, mut rule: Rule) -> Result<Rule> {
        validate_rule(&rule)?;
        let now = self.clock.now();
        rule.created_at = now;
        rule.updated_at = now;
        self.repos.rules.create_rule(&rule).await?;
        Ok(rule)
    }

    /// Replace a rule's configuration, keeping its statistics and rotation.
    pub async fn update_rule(&self, mut rule: Rule) -> Result<Rule> {
        let stored = self.owned_rule(&rule.owner_id, &rule.id).await?;
        validate_rule(&rule)?;

        rule.stats = stored.stats;
        rule.rotation_cursor = stored.rotation_cursor;
        rule.created_at = stored.created_at;
        rule.updated_at = self.clock.now();
        self.repos.rules.update_rule(&rule).await?;
        Ok(rule)
    }

    /// Delete a rule. Refused while an active monitor references it.
    pub async fn delete_rule(&self, owner_id: &str, rule_id: &str) -> Result<()> {
        self.owned_rule(owner_id, rule_id).await?;

        let referencing = self
            .repos
            .monitors
            .list_active_referencing_rule(rule_id)
            .await?;
        if let Some(monitor) = referencing.first() {
            return Err(Error::conflict(format!(
                "rule {} is used by active monitor {}",
                rule_id, monitor.id
            )));
        }

        self.repos.rules.delete_rule(rule_id).await?;
        info!(rule_id, "Rule deleted");
        Ok(())
    }

    async fn owned_monitor(&self, owner_id: &str, monitor_id: &str) -> Result<Monitor> {
        match self.repos.monitors.find_monitor(monitor_id).await? {
            Some(monitor) if monitor.owner_id == owner_id => Ok(monitor),
            _ => Err(Error::not_found("Monitor", monitor_id)),
        }
    }

    async fn owned_rule(&self, owner_id: &str, rule_id: &str) -> Result<Rule> {
        match self.repos.rules.find_rule(rule_id).await? {
            Some(rule) if rule.owner_id == owner_id => Ok(rule),
            _ => Err(Error::not_found("Rule", rule_id)),
        }
    }

    async fn validate_monitor(&self, monitor: &Monitor) -> Result<()> {
        if monitor.name.trim().is_empty() {
            return Err(Error::validation("monitor name is required"));
        }
        if monitor.page_id.trim().is_empty() {
            return Err(Error::validation("page id is required"));
        }
        if monitor.page_token.is_empty() {
            return Err(Error::validation("page access token is required"));
        }
        if !monitor.posts.all_posts && monitor.posts.posts.is_empty() {
            return Err(Error::validation(
                "select at least one post or monitor all posts",
            ));
        }

        let unique: HashSet<&str> = monitor.rule_ids.iter().map(String::as_str).collect();
        if unique.len() > limits::MAX_RULES_PER_MONITOR {
            return Err(Error::validation(format!(
                "a monitor may reference at most {} rules",
                limits::MAX_RULES_PER_MONITOR
            )));
        }
        for rule_id in unique {
            self.owned_rule(&monitor.owner_id, rule_id).await?;
        }
        Ok(())
    }
}

fn validate_rule(rule: &Rule) -> Result<()> {
    if rule.name.trim().is_empty() {
        return Err(Error::validation("rule name is required"));
    }
    if rule.keywords.iter().all(|k| k.trim().is_empty()) {
        return Err(Error::validation("a rule needs at least one keyword"));
    }
    if rule.match_mode == MatchMode::Regex {
        for pattern in &rule.keywords {
            regex::RegexBuilder::new(pattern)
                .case_insensitive(!rule.case_sensitive)
                .build()
                .map_err(|e| Error::validation(format!("invalid pattern {:?}: {}", pattern, e)))?;
        }
    }
    if let (Some(min), Some(max)) = (rule.min_comment_length, rule.max_comment_length)
        && min > max
    {
        return Err(Error::validation(
            "minimum comment length exceeds the maximum",
        ));
    }
    Ok(())
}
