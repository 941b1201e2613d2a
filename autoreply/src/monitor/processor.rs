//! Per-monitor processing pipeline.
//!
//! One pass lists the monitor's target posts, fetches their comments and
//! walks each comment through: idempotency check, filter, admission, rule
//! matching, response generation, dispatch, persistence and statistics.
//! Failures on one comment or post are recorded on the monitor and the pass
//! moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::events::{EngineEvent, EngineEventBroadcaster};
use super::outcome::{CommentOutcome, PostReport, ProcessReport, SkipReason};
use crate::clock::SharedClock;
use crate::database::repositories::Repositories;
use crate::dispatch::Dispatcher;
use crate::domain::filter::{FilterEvaluator, FilterRejection, FilterVerdict, RuleMatcher};
use crate::domain::{IncomingComment, Monitor, MonitorStatus, ResponseRecord, Rule};
use crate::governor::RateGovernor;
use crate::platform::PlatformApi;
use crate::{Error, Result, analysis, limits, response};

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Pause after each reply attempt to respect the platform's own limits
    /// (default: 1s).
    pub comment_pause: Duration,
    /// Timeout of each platform read (default: 15s).
    pub fetch_timeout: Duration,
    /// Timeout of each reply (default: 15s).
    pub dispatch_timeout: Duration,
    /// Lifetime of response records in days, capped at 7 (default: 3).
    pub response_ttl_days: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            comment_pause: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(15),
            dispatch_timeout: Duration::from_secs(15),
            response_ttl_days: limits::RESPONSE_TTL_DAYS_DEFAULT,
        }
    }
}

/// Runs processing passes for monitors.
pub struct MonitorProcessor {
    repos: Repositories,
    platform: Arc<dyn PlatformApi>,
    governor: RateGovernor,
    dispatcher: Dispatcher,
    clock: SharedClock,
    events: EngineEventBroadcaster,
    config: ProcessorConfig,
    /// Monitors with a pass in progress.
    in_flight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

/// Why the remaining work of a pass was abandoned.
enum Halt {
    Paused,
    MonitorLeftActive,
}

impl MonitorProcessor {
    pub fn new(
        repos: Repositories,
        platform: Arc<dyn PlatformApi>,
        governor: RateGovernor,
        clock: SharedClock,
        events: EngineEventBroadcaster,
        config: ProcessorConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&platform),
            governor.clone(),
            config.dispatch_timeout,
        );
        Self {
            repos,
            platform,
            governor,
            dispatcher,
            clock,
            events,
            config,
            in_flight: DashMap::new(),
        }
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    /// Run one pass over `monitor_id`. Used by the scheduler and by manual
    /// triggers. A concurrent pass on the same monitor is skipped.
    pub async fn process_monitor(&self, monitor_id: &str) -> ProcessReport {
        let lock = self
            .in_flight
            .entry(monitor_id.to_string())
            .or_default()
            .clone();
        let Ok(guard) = lock.try_lock_owned() else {
            debug!(monitor_id, "Pass already running");
            return self.skip(monitor_id, SkipReason::AlreadyRunning);
        };

        let report = match self.run_pass(monitor_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!(monitor_id, error = %e, "Monitor pass failed");
                ProcessReport::failed(monitor_id, e.to_string())
            }
        };

        drop(guard);
        self.in_flight
            .remove_if(monitor_id, |_, lock| Arc::strong_count(lock) == 1);
        report
    }

    fn skip(&self, monitor_id: &str, reason: SkipReason) -> ProcessReport {
        self.events.publish(EngineEvent::MonitorSkipped {
            monitor_id: monitor_id.to_string(),
            reason,
            timestamp: self.clock.now(),
        });
        ProcessReport::skipped(monitor_id, reason)
    }

    async fn eligibility(&self, monitor: &Monitor) -> Result<Option<SkipReason>> {
        if !monitor.status.is_active() {
            return Ok(Some(SkipReason::Inactive));
        }
        if monitor.is_expired(self.clock.now()) {
            return Ok(Some(SkipReason::Expired));
        }

        let tier = self.repos.owners.subscription_tier(&monitor.owner_id).await?;
        let active = self
            .repos
            .monitors
            .count_by_owner_and_status(&monitor.owner_id, MonitorStatus::Active)
            .await?;
        if active > tier.active_monitor_quota() as u64 {
            info!(
                monitor_id = %monitor.id,
                owner_id = %monitor.owner_id,
                tier = tier.as_str(),
                active,
                "Owner over active monitor quota"
            );
            return Ok(Some(SkipReason::QuotaExceeded));
        }
        Ok(None)
    }

    async fn run_pass(&self, monitor_id: &str) -> Result<ProcessReport> {
        let Some(mut monitor) = self.repos.monitors.find_monitor(monitor_id).await? else {
            return Ok(self.skip(monitor_id, SkipReason::NotFound));
        };
        if let Some(reason) = self.eligibility(&monitor).await? {
            return Ok(self.skip(monitor_id, reason));
        }

        let mut report = ProcessReport {
            monitor_id: monitor_id.to_string(),
            success: true,
            ..Default::default()
        };

        let mut rules = self.repos.rules.get_rules(&monitor.rule_ids).await?;

        let post_ids = match self.target_posts(&monitor).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(monitor_id, error = %e, "Listing posts failed");
                monitor.record_error(e.to_string(), e.code(), self.clock.now());
                self.finish(&mut monitor).await?;
                report.success = false;
                report.error = Some(e.to_string());
                return Ok(report);
            }
        };

        debug!(monitor_id, posts = post_ids.len(), rules = rules.len(), "Starting pass");

        for (index, post_id) in post_ids.iter().enumerate() {
            if index > 0
                && let Some(halt) = self.should_halt(&mut monitor).await?
            {
                log_halt(monitor_id, &halt);
                break;
            }

            let (post_report, halt) = self.process_post(&mut monitor, &mut rules, post_id).await;
            report.per_post.push(post_report);
            report.posts_processed += 1;

            monitor.mark_post_checked(post_id, self.clock.now());
            if let Err(e) = self.save(&monitor).await {
                warn!(monitor_id, error = %e, "Saving monitor progress failed");
            }

            if let Some(halt) = halt {
                log_halt(monitor_id, &halt);
                break;
            }
        }

        self.finish(&mut monitor).await?;
        info!(
            monitor_id,
            posts = report.posts_processed,
            responded = report.responded(),
            "Pass completed"
        );
        Ok(report)
    }

    async fn target_posts(&self, monitor: &Monitor) -> Result<Vec<String>> {
        if !monitor.posts.all_posts {
            return Ok(monitor
                .posts
                .posts
                .iter()
                .take(limits::MAX_POSTS_PER_MONITOR)
                .map(|p| p.post_id.clone())
                .collect());
        }

        let posts = self
            .with_timeout(self.platform.list_posts(&monitor.page_id, &monitor.page_token))
            .await?;
        Ok(posts
            .into_iter()
            .take(monitor.post_cap())
            .map(|p| p.id)
            .collect())
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, graph_api::ApiError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.fetch_timeout, fut).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Platform(graph_api::ApiError::Timeout(
                self.config.fetch_timeout,
            ))),
        }
    }

    /// Polled between posts: the global pause flag and the stored status.
    async fn should_halt(&self, monitor: &mut Monitor) -> Result<Option<Halt>> {
        if self.governor.is_paused() {
            return Ok(Some(Halt::Paused));
        }
        match self.repos.monitors.find_monitor(&monitor.id).await? {
            Some(stored) if stored.status.is_active() => Ok(None),
            Some(stored) => {
                monitor.status = stored.status;
                Ok(Some(Halt::MonitorLeftActive))
            }
            None => Ok(Some(Halt::MonitorLeftActive)),
        }
    }

    async fn process_post(
        &self,
        monitor: &mut Monitor,
        rules: &mut [Rule],
        post_id: &str,
    ) -> (PostReport, Option<Halt>) {
        let mut post_report = PostReport::new(post_id);

        let comments = match self
            .with_timeout(self.platform.list_comments(post_id, &monitor.page_token))
            .await
        {
            Ok(comments) => comments,
            Err(e) => {
                warn!(monitor_id = %monitor.id, post_id, error = %e, "Fetching comments failed");
                monitor.record_error(e.to_string(), e.code(), self.clock.now());
                post_report.error = Some(e.to_string());
                return (post_report, None);
            }
        };

        let comments = select_comments(monitor, comments);

        for comment in &comments {
            if self.governor.is_paused() {
                return (post_report, Some(Halt::Paused));
            }

            let outcome = match self.process_comment(monitor, rules, comment).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        monitor_id = %monitor.id,
                        comment_id = %comment.id,
                        error = %e,
                        "Processing comment failed"
                    );
                    monitor.record_error(e.to_string(), e.code(), self.clock.now());
                    CommentOutcome::Error(e.to_string())
                }
            };
            post_report.record(&outcome);

            let attempted = matches!(
                outcome,
                CommentOutcome::Responded | CommentOutcome::DispatchFailed
            );
            if attempted && !self.config.comment_pause.is_zero() {
                tokio::time::sleep(self.config.comment_pause).await;
            }
        }

        (post_report, None)
    }

    async fn process_comment(
        &self,
        monitor: &mut Monitor,
        rules: &mut [Rule],
        comment: &IncomingComment,
    ) -> Result<CommentOutcome> {
        if self.repos.responses.exists(&monitor.id, &comment.id).await? {
            return Ok(CommentOutcome::AlreadyProcessed);
        }

        let now = self.clock.now();
        // Comments left unanswered come back on every pass; count them once.
        let first_sighting = self
            .repos
            .responses
            .mark_seen(&monitor.id, &comment.id, now)
            .await?;
        if first_sighting {
            monitor.record_comment_found();
        }

        if let FilterVerdict::Rejected(reason) = FilterEvaluator::evaluate(comment, &monitor.filters)
        {
            if reason == FilterRejection::Spam && first_sighting {
                monitor.record_spam();
            }
            debug!(monitor_id = %monitor.id, comment_id = %comment.id, reason = reason.as_str(), "Comment filtered");
            self.events.publish(EngineEvent::CommentFiltered {
                monitor_id: monitor.id.clone(),
                comment_id: comment.id.clone(),
                reason,
                timestamp: now,
            });
            return Ok(CommentOutcome::Filtered(reason));
        }

        let permit = match self.governor.try_acquire(monitor) {
            Ok(permit) => permit,
            Err(denied) => {
                debug!(monitor_id = %monitor.id, comment_id = %comment.id, %denied, "Rate limited");
                self.events.publish(EngineEvent::RateLimited {
                    monitor_id: monitor.id.clone(),
                    comment_id: comment.id.clone(),
                    reason: denied.to_string(),
                    timestamp: now,
                });
                return Ok(CommentOutcome::RateLimited);
            }
        };

        let rule_index = RuleMatcher::best_match(comment, rules, now)
            .and_then(|matched| rules.iter().position(|r| std::ptr::eq(r, matched)));
        if rule_index.is_none() && !monitor.behavior.respond_to_all {
            // Dropping the permit releases the reservation.
            drop(permit);
            return Ok(CommentOutcome::NoRuleMatched);
        }

        let generated = response::generate(
            comment,
            rule_index.map(|i| &rules[i]),
            monitor,
            now,
        );
        if let (Some(i), Some(rotation)) = (rule_index, generated.rotation.as_ref()) {
            rules[i].rotation_cursor = rotation.cursor;
            self.repos
                .rules
                .update_rotation(&rotation.rule_id, rotation.cursor, now)
                .await?;
        }

        let result = self
            .dispatcher
            .dispatch(permit, &comment.id, &generated.text, &monitor.page_token)
            .await;

        let done_at = self.clock.now();
        let record = ResponseRecord {
            id: uuid::Uuid::new_v4().to_string(),
            monitor_id: monitor.id.clone(),
            owner_id: monitor.owner_id.clone(),
            rule_id: rule_index.map(|i| rules[i].id.clone()),
            page_id: monitor.page_id.clone(),
            post_id: comment.post_id.clone(),
            comment_id: comment.id.clone(),
            comment_text: comment.text.clone(),
            author_id: comment.author_id.clone(),
            author_name: comment.author_name.clone(),
            sentiment: generated.sentiment,
            is_spam: analysis::is_spam(&comment.text),
            response_text: generated.text.clone(),
            outcome: result.outcome.clone(),
            latency_ms: result.latency_ms,
            created_at: done_at,
            expires_at: done_at + limits::response_ttl(self.config.response_ttl_days),
        };

        match self.repos.responses.insert(&record).await {
            Ok(()) => {}
            Err(Error::Conflict(msg)) => {
                warn!(monitor_id = %monitor.id, comment_id = %comment.id, %msg, "Comment answered concurrently");
                return Ok(CommentOutcome::AlreadyProcessed);
            }
            Err(e) => return Err(e),
        }

        let success = result.outcome.is_success();
        monitor.record_response(success, result.latency_ms, generated.sentiment, done_at);
        if let Some(err) = result.outcome.error() {
            monitor.set_last_error(err.message.clone(), err.code.clone(), done_at);
        }

        if let Some(i) = rule_index {
            let rule = &mut rules[i];
            rule.record_trigger(success, generated.sentiment, done_at);
            self.repos
                .rules
                .update_stats(&rule.id, &rule.stats, done_at)
                .await?;
        }

        match &result.outcome {
            crate::domain::DispatchOutcome::Sent { message_id } => {
                self.events.publish(EngineEvent::CommentResponded {
                    monitor_id: monitor.id.clone(),
                    comment_id: comment.id.clone(),
                    rule_id: record.rule_id.clone(),
                    message_id: message_id.clone(),
                    latency_ms: result.latency_ms,
                    timestamp: done_at,
                });
                Ok(CommentOutcome::Responded)
            }
            crate::domain::DispatchOutcome::Failed(err) => {
                self.events.publish(EngineEvent::DispatchFailed {
                    monitor_id: monitor.id.clone(),
                    comment_id: comment.id.clone(),
                    message: err.message.clone(),
                    code: err.code.clone(),
                    timestamp: done_at,
                });
                Ok(CommentOutcome::DispatchFailed)
            }
        }
    }

    /// Persist counters and checkpoints only. Status and configuration may
    /// have been changed by the owner or by retention while the pass ran.
    async fn save(&self, monitor: &Monitor) -> Result<()> {
        self.repos
            .monitors
            .update_progress(&monitor.id, &monitor.progress())
            .await
    }

    async fn finish(&self, monitor: &mut Monitor) -> Result<()> {
        let now = self.clock.now();
        monitor.last_checked_at = Some(now);
        monitor.updated_at = now;
        match self.save(monitor).await {
            // Deleted mid-pass.
            Err(Error::NotFound { .. }) => Ok(()),
            other => other,
        }
    }
}

/// Drop comments that predate the monitor unless configured otherwise, and
/// order newest first when requested.
fn select_comments(monitor: &Monitor, comments: Vec<IncomingComment>) -> Vec<IncomingComment> {
    let cutoff: Option<DateTime<Utc>> =
        (!monitor.behavior.reply_to_existing_comments).then_some(monitor.created_at);

    let mut selected: Vec<_> = comments
        .into_iter()
        .filter(|c| match (cutoff, c.created_at) {
            (Some(cutoff), Some(created)) => created >= cutoff,
            _ => true,
        })
        .collect();

    if monitor.rate_limit.prioritize_newer {
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    selected
}

fn log_halt(monitor_id: &str, halt: &Halt) {
    match halt {
        Halt::Paused => info!(monitor_id, "System paused, abandoning pass"),
        Halt::MonitorLeftActive => info!(monitor_id, "Monitor no longer active, stopping pass"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccessToken;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn monitor() -> Monitor {
        Monitor::new("o1", "m", "page", AccessToken::new("t"), at(0))
    }

    fn comment(id: &str, created: i64) -> IncomingComment {
        IncomingComment::new(id, "p1", "hello").with_created_at(at(created))
    }

    fn ids(comments: &[IncomingComment]) -> Vec<&str> {
        comments.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_older_comments_are_skipped_and_newest_come_first() {
        let m = monitor();
        let selected = select_comments(
            &m,
            vec![comment("old", -60), comment("a", 10), comment("b", 20)],
        );
        assert_eq!(ids(&selected), vec!["b", "a"]);
    }

    #[test]
    fn test_existing_comments_kept_when_configured() {
        let mut m = monitor();
        m.behavior.reply_to_existing_comments = true;
        m.rate_limit.prioritize_newer = false;
        let selected = select_comments(
            &m,
            vec![comment("old", -60), comment("a", 10), comment("b", 20)],
        );
        assert_eq!(ids(&selected), vec!["old", "a", "b"]);
    }
}
