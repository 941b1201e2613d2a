//! End-to-end tests of the monitor pipeline.
//!
//! Each test wires the processor to in-memory repositories, a scripted
//! platform and a manual clock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use graph_api::ApiError;
use parking_lot::Mutex;

use autoreply::clock::{Clock, ManualClock};
use autoreply::database::repositories::{MonitorRepository, Repositories};
use autoreply::domain::{
    AccessToken, IncomingComment, Monitor, MonitorStatus, Rule, SubscriptionTier,
};
use autoreply::governor::RateGovernor;
use autoreply::monitor::{
    EngineEvent, EngineEventBroadcaster, MonitorProcessor, ProcessorConfig, SkipReason,
};
use autoreply::platform::{PlatformApi, PlatformPost};

#[derive(Default)]
struct ScriptedPlatform {
    posts: Mutex<Vec<PlatformPost>>,
    comments: Mutex<HashMap<String, Vec<IncomingComment>>>,
    replies: Mutex<Vec<(String, String)>>,
    fail_replies: Mutex<bool>,
    fail_list_posts: Mutex<bool>,
    /// Posts whose comments cannot be listed.
    failing_posts: Mutex<HashSet<String>>,
    fetch_delay: Mutex<Duration>,
    /// Status stored for a monitor on the next comment fetch, as if the
    /// owner changed it while the pass was running.
    status_on_fetch: Mutex<Option<(Arc<dyn MonitorRepository>, String, MonitorStatus)>>,
    /// Governor paused right after the next successful reply.
    pause_on_reply: Mutex<Option<RateGovernor>>,
}

impl ScriptedPlatform {
    fn add_comment(&self, comment: IncomingComment) {
        self.comments
            .lock()
            .entry(comment.post_id.clone())
            .or_default()
            .push(comment);
    }

    fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl PlatformApi for ScriptedPlatform {
    async fn list_posts(
        &self,
        _page_id: &str,
        _token: &AccessToken,
    ) -> Result<Vec<PlatformPost>, ApiError> {
        if *self.fail_list_posts.lock() {
            return Err(ApiError::Api {
                status: 500,
                message: "Service temporarily unavailable".to_string(),
                code: Some(2),
            });
        }
        Ok(self.posts.lock().clone())
    }

    async fn list_comments(
        &self,
        post_id: &str,
        _token: &AccessToken,
    ) -> Result<Vec<IncomingComment>, ApiError> {
        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let status_change = self.status_on_fetch.lock().take();
        if let Some((monitors, monitor_id, status)) = status_change {
            monitors
                .update_status(&monitor_id, status, start())
                .await
                .unwrap();
        }
        if self.failing_posts.lock().contains(post_id) {
            return Err(ApiError::Api {
                status: 400,
                message: "Unsupported get request".to_string(),
                code: Some(100),
            });
        }
        Ok(self
            .comments
            .lock()
            .get(post_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn reply_to_comment(
        &self,
        comment_id: &str,
        message: &str,
        _token: &AccessToken,
    ) -> Result<String, ApiError> {
        if *self.fail_replies.lock() {
            return Err(ApiError::Api {
                status: 403,
                message: "Permissions error".to_string(),
                code: Some(200),
            });
        }
        let governor = self.pause_on_reply.lock().take();
        if let Some(governor) = governor {
            governor.pause_for(Duration::from_secs(300));
        }
        let mut replies = self.replies.lock();
        replies.push((comment_id.to_string(), message.to_string()));
        Ok(format!("reply-{}", replies.len()))
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    repos: Repositories,
    platform: Arc<ScriptedPlatform>,
    events: EngineEventBroadcaster,
    processor: MonitorProcessor,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

fn harness(tier: SubscriptionTier) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let repos = Repositories::memory(tier);
    let platform = Arc::new(ScriptedPlatform::default());
    let events = EngineEventBroadcaster::new();
    let processor = MonitorProcessor::new(
        repos.clone(),
        platform.clone(),
        RateGovernor::new(clock.clone()),
        clock.clone(),
        events.clone(),
        ProcessorConfig {
            comment_pause: Duration::ZERO,
            ..Default::default()
        },
    );
    Harness {
        clock,
        repos,
        platform,
        events,
        processor,
    }
}

impl Harness {
    async fn add_rule(&self, id: &str, keywords: &[&str], responses: &[&str], priority: i32) -> Rule {
        let mut rule = Rule::new("owner-1", id, self.clock.now())
            .with_keywords(keywords)
            .with_responses(responses)
            .with_priority(priority);
        rule.id = id.to_string();
        self.repos.rules.create_rule(&rule).await.unwrap();
        rule
    }

    async fn add_monitor(&self, id: &str, rule_ids: &[&str]) -> Monitor {
        self.add_monitor_on(id, &["post-1"], rule_ids).await
    }

    async fn add_monitor_on(&self, id: &str, posts: &[&str], rule_ids: &[&str]) -> Monitor {
        let mut monitor = Monitor::new(
            "owner-1",
            id,
            "page-1",
            AccessToken::new("page-token"),
            self.clock.now(),
        )
        .with_posts(posts)
        .with_rules(rule_ids);
        monitor.id = id.to_string();
        self.repos.monitors.create_monitor(&monitor).await.unwrap();
        monitor
    }

    async fn update(&self, monitor: &Monitor) {
        self.repos.monitors.update_monitor(monitor).await.unwrap();
    }

    fn comment(&self, id: &str, text: &str, secs_after_start: i64) {
        self.comment_on("post-1", id, text, secs_after_start);
    }

    fn comment_on(&self, post_id: &str, id: &str, text: &str, secs_after_start: i64) {
        self.platform.add_comment(
            IncomingComment::new(id, post_id, text)
                .with_author(format!("user-{}", id), "Sam")
                .with_created_at(start() + chrono::Duration::seconds(secs_after_start)),
        );
    }

    async fn records(&self, monitor_id: &str) -> Vec<autoreply::domain::ResponseRecord> {
        self.repos
            .responses
            .list_for_monitor(monitor_id, 1000)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_comment_is_answered_once() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("price", &["price"], &["DM us for prices"], 0).await;
    h.add_monitor("m1", &["price"]).await;
    h.comment("c1", "what is the price?", 5);

    let first = h.processor.process_monitor("m1").await;
    assert!(first.success);
    assert_eq!(first.responded(), 1);

    h.clock.advance_secs(60);
    let second = h.processor.process_monitor("m1").await;
    assert_eq!(second.responded(), 0);
    assert_eq!(second.per_post[0].already_processed, 1);

    assert_eq!(h.records("m1").await.len(), 1);
    assert_eq!(
        h.platform.replies(),
        vec![("c1".to_string(), "DM us for prices".to_string())]
    );

    let monitor = h.repos.monitors.get_monitor("m1").await.unwrap();
    assert_eq!(monitor.stats.responses_sent, 1);
    assert!(monitor.last_checked_at.is_some());
    assert!(monitor.posts.posts[0].last_checked_at.is_some());
}

#[tokio::test]
async fn test_no_matching_rule_without_respond_to_all_sends_nothing() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("price", &["price"], &["DM us"], 0).await;
    h.add_monitor("m1", &["price"]).await;
    h.comment("c1", "lovely colours", 5);

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.per_post[0].no_rule_matched, 1);
    assert!(h.records("m1").await.is_empty());
    assert!(h.platform.replies().is_empty());
}

#[tokio::test]
async fn test_respond_to_all_uses_monitor_default() {
    let h = harness(SubscriptionTier::Free);
    let mut monitor = h.add_monitor("m1", &[]).await;
    monitor.behavior.respond_to_all = true;
    monitor.default_response = "Thanks for stopping by!".to_string();
    h.update(&monitor).await;
    h.comment("c1", "lovely colours", 5);

    h.processor.process_monitor("m1").await;
    let records = h.records("m1").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].rule_id, None);
    assert_eq!(records[0].response_text, "Thanks for stopping by!");
}

#[tokio::test]
async fn test_equal_priority_prefers_first_defined_rule() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("first", &["price"], &["from first"], 5).await;
    h.add_rule("second", &["price"], &["from second"], 5).await;
    h.add_rule("low", &["price"], &["from low"], 1).await;
    h.add_monitor("m1", &["low", "first", "second"]).await;
    h.comment("c1", "price please", 5);

    h.processor.process_monitor("m1").await;
    let records = h.records("m1").await;
    assert_eq!(records[0].rule_id.as_deref(), Some("first"));
    assert_eq!(records[0].response_text, "from first");

    let rule = h.repos.rules.get_rule("first").await.unwrap();
    assert_eq!(rule.stats.triggered, 1);
    assert_eq!(rule.stats.responses_sent, 1);
}

#[tokio::test]
async fn test_short_comment_never_matches_rule_with_min_length() {
    let h = harness(SubscriptionTier::Free);
    let mut rule = h.add_rule("price", &["price"], &["DM us"], 0).await;
    rule.min_comment_length = Some(20);
    h.repos.rules.update_rule(&rule).await.unwrap();
    h.add_monitor("m1", &["price"]).await;
    h.comment("c1", "price?", 5);

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.per_post[0].no_rule_matched, 1);
    assert!(h.platform.replies().is_empty());
}

#[tokio::test]
async fn test_sequential_rotation_is_persisted() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["A", "B"], 0).await;
    h.add_monitor("m1", &["hi"]).await;
    h.comment("c1", "hello there", 5);

    h.processor.process_monitor("m1").await;
    h.clock.advance_secs(31);
    h.comment("c2", "hello again", 20);
    h.processor.process_monitor("m1").await;

    let texts: Vec<String> = h.platform.replies().into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["A", "B"]);
    assert_eq!(h.repos.rules.get_rule("hi").await.unwrap().rotation_cursor, 0);
}

#[tokio::test]
async fn test_spacing_and_hourly_ceiling_bound_dispatches() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor("m1", &["hi"]).await;
    for n in 0..35 {
        h.comment(&format!("c{}", n), "hello", 1 + n);
    }

    let first = h.processor.process_monitor("m1").await;
    assert_eq!(first.responded(), 1);
    assert_eq!(first.per_post[0].rate_limited, 34);

    let mut attempts = first.dispatch_attempts();
    // Default spacing is 30s.
    for _ in 0..40 {
        h.clock.advance_secs(31);
        attempts += h.processor.process_monitor("m1").await.dispatch_attempts();
    }

    assert_eq!(attempts, 30);
    assert_eq!(h.platform.replies().len(), 30);
}

#[tokio::test]
async fn test_failed_dispatch_is_recorded() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor("m1", &["hi"]).await;
    h.comment("c1", "hello", 5);
    *h.platform.fail_replies.lock() = true;
    let mut events = h.events.subscribe();

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.per_post[0].failed, 1);

    let records = h.records("m1").await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].succeeded());
    assert_eq!(
        records[0].outcome.error().and_then(|e| e.code.as_deref()),
        Some("200")
    );

    let monitor = h.repos.monitors.get_monitor("m1").await.unwrap();
    assert_eq!(monitor.stats.errors, 1);
    assert_eq!(monitor.stats.responses_sent, 0);
    assert_eq!(
        monitor.last_error.map(|e| e.message),
        Some("Permissions error".to_string())
    );

    let event = events.try_recv().unwrap();
    assert!(matches!(event, EngineEvent::DispatchFailed { ref comment_id, .. } if comment_id == "c1"));
}

#[tokio::test]
async fn test_spam_is_filtered_and_counted() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor("m1", &["hi"]).await;
    h.comment("c1", "HELLO CLICK HERE FOR FREE MONEY", 5);

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.per_post[0].filtered, 1);
    assert!(h.platform.replies().is_empty());

    let monitor = h.repos.monitors.get_monitor("m1").await.unwrap();
    assert_eq!(monitor.stats.spam_detected, 1);
    assert_eq!(monitor.stats.comments_found, 1);
}

#[tokio::test]
async fn test_comments_before_monitor_creation_are_ignored() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor("m1", &["hi"]).await;
    h.comment("old", "hello", -3600);

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.per_post[0].comments_seen, 0);
    assert!(h.platform.replies().is_empty());
}

#[tokio::test]
async fn test_owner_over_quota_is_skipped() {
    let h = harness(SubscriptionTier::Free);
    h.add_monitor("m1", &[]).await;
    h.add_monitor("m2", &[]).await;
    h.add_monitor("m3", &[]).await;

    let report = h.processor.process_monitor("m1").await;
    assert!(report.success);
    assert_eq!(report.skipped, Some(SkipReason::QuotaExceeded));

    h.repos
        .monitors
        .update_status("m3", MonitorStatus::Paused, h.clock.now())
        .await
        .unwrap();
    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.skipped, None);
}

#[tokio::test]
async fn test_inactive_and_missing_monitors_are_skipped() {
    let h = harness(SubscriptionTier::Free);
    h.add_monitor("m1", &[]).await;
    h.repos
        .monitors
        .update_status("m1", MonitorStatus::Paused, h.clock.now())
        .await
        .unwrap();

    assert_eq!(
        h.processor.process_monitor("m1").await.skipped,
        Some(SkipReason::Inactive)
    );
    assert_eq!(
        h.processor.process_monitor("nope").await.skipped,
        Some(SkipReason::NotFound)
    );
}

#[tokio::test]
async fn test_expired_monitor_is_skipped() {
    let h = harness(SubscriptionTier::Free);
    h.add_monitor("m1", &[]).await;
    h.clock.advance_secs(31 * 24 * 3600);

    assert_eq!(
        h.processor.process_monitor("m1").await.skipped,
        Some(SkipReason::Expired)
    );
}

#[tokio::test]
async fn test_concurrent_pass_on_same_monitor_is_skipped() {
    let h = harness(SubscriptionTier::Free);
    h.add_monitor("m1", &[]).await;
    *h.platform.fetch_delay.lock() = Duration::from_millis(50);

    let (a, b) = tokio::join!(
        h.processor.process_monitor("m1"),
        h.processor.process_monitor("m1")
    );
    let skipped: Vec<_> = [&a, &b].iter().filter_map(|r| r.skipped).collect();
    assert_eq!(skipped, vec![SkipReason::AlreadyRunning]);

    // The lock is released once the pass finishes.
    *h.platform.fetch_delay.lock() = Duration::ZERO;
    assert_eq!(h.processor.process_monitor("m1").await.skipped, None);
}

#[tokio::test]
async fn test_paused_system_processes_nothing() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor("m1", &["hi"]).await;
    h.comment("c1", "hello", 5);
    h.processor.governor().pause_for(Duration::from_secs(300));

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.responded(), 0);
    assert!(h.platform.replies().is_empty());
}

#[tokio::test]
async fn test_unanswered_comments_are_counted_once() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor("m1", &["hi"]).await;
    h.comment("spam", "HELLO CLICK HERE FOR FREE MONEY", 5);
    h.comment("chat", "lovely colours", 6);

    for _ in 0..3 {
        let report = h.processor.process_monitor("m1").await;
        assert_eq!(report.per_post[0].filtered, 1);
        assert_eq!(report.per_post[0].no_rule_matched, 1);
        h.clock.advance_secs(60);
    }

    let monitor = h.repos.monitors.get_monitor("m1").await.unwrap();
    assert_eq!(monitor.stats.comments_found, 2);
    assert_eq!(monitor.stats.spam_detected, 1);
}

#[tokio::test]
async fn test_status_change_during_pass_survives_progress_save() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor("m1", &["hi"]).await;
    h.comment("c1", "hello", 5);
    *h.platform.status_on_fetch.lock() =
        Some((h.repos.monitors.clone(), "m1".to_string(), MonitorStatus::Paused));

    let report = h.processor.process_monitor("m1").await;
    assert!(report.success);

    let monitor = h.repos.monitors.get_monitor("m1").await.unwrap();
    assert_eq!(monitor.status, MonitorStatus::Paused);
    assert_eq!(monitor.stats.responses_sent, 1);
    assert!(monitor.last_checked_at.is_some());
}

#[tokio::test]
async fn test_pass_stops_when_monitor_leaves_active_between_posts() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor_on("m1", &["post-1", "post-2"], &["hi"]).await;
    h.comment_on("post-1", "c1", "hello", 5);
    h.comment_on("post-2", "c2", "hello", 5);
    *h.platform.status_on_fetch.lock() =
        Some((h.repos.monitors.clone(), "m1".to_string(), MonitorStatus::Archived));

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.posts_processed, 1);
    assert_eq!(report.per_post.len(), 1);
    assert_eq!(h.platform.replies().len(), 1);

    let monitor = h.repos.monitors.get_monitor("m1").await.unwrap();
    assert_eq!(monitor.status, MonitorStatus::Archived);
}

#[tokio::test]
async fn test_failed_comment_fetch_does_not_stop_other_posts() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor_on("m1", &["post-1", "post-2"], &["hi"]).await;
    h.comment_on("post-2", "c2", "hello", 5);
    h.platform.failing_posts.lock().insert("post-1".to_string());

    let report = h.processor.process_monitor("m1").await;
    assert!(report.success);
    assert_eq!(report.posts_processed, 2);
    assert!(report.per_post[0].error.is_some());
    assert_eq!(report.per_post[1].responded, 1);

    let monitor = h.repos.monitors.get_monitor("m1").await.unwrap();
    assert_eq!(monitor.stats.errors, 1);
    assert_eq!(monitor.stats.responses_sent, 1);
    assert_eq!(
        monitor.last_error.and_then(|e| e.code),
        Some("100".to_string())
    );
    assert!(monitor.posts.posts.iter().all(|p| p.last_checked_at.is_some()));
}

#[tokio::test]
async fn test_failed_post_listing_is_recorded() {
    let h = harness(SubscriptionTier::Free);
    let mut monitor = h.add_monitor_on("m1", &[], &[]).await;
    monitor.posts.all_posts = true;
    h.update(&monitor).await;
    *h.platform.fail_list_posts.lock() = true;

    let report = h.processor.process_monitor("m1").await;
    assert!(!report.success);
    assert!(report.error.is_some());
    assert!(report.per_post.is_empty());

    let monitor = h.repos.monitors.get_monitor("m1").await.unwrap();
    assert_eq!(monitor.stats.errors, 1);
    assert_eq!(monitor.last_error.and_then(|e| e.code), Some("2".to_string()));
    assert!(monitor.last_checked_at.is_some());
}

#[tokio::test]
async fn test_all_posts_mode_processes_listed_posts() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    let mut monitor = h.add_monitor_on("m1", &[], &["hi"]).await;
    monitor.posts.all_posts = true;
    monitor.posts.max_posts = 1;
    h.update(&monitor).await;
    *h.platform.posts.lock() = vec![
        PlatformPost {
            id: "post-9".to_string(),
            created_at: start(),
        },
        PlatformPost {
            id: "post-8".to_string(),
            created_at: start(),
        },
    ];
    h.comment_on("post-9", "c9", "hello", 5);
    h.comment_on("post-8", "c8", "hello", 5);

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.posts_processed, 1);
    assert_eq!(
        h.platform.replies(),
        vec![("c9".to_string(), "Hi!".to_string())]
    );
}

#[tokio::test]
async fn test_pause_during_post_abandons_remaining_comments() {
    let h = harness(SubscriptionTier::Free);
    h.add_rule("hi", &["hello"], &["Hi!"], 0).await;
    h.add_monitor_on("m1", &["post-1", "post-2"], &["hi"]).await;
    for n in 0..3 {
        h.comment_on("post-1", &format!("c{}", n), "hello", 5 + n);
    }
    h.comment_on("post-2", "other", "hello", 5);
    *h.platform.pause_on_reply.lock() = Some(h.processor.governor().clone());

    let report = h.processor.process_monitor("m1").await;
    assert_eq!(report.posts_processed, 1);
    assert_eq!(report.per_post[0].comments_seen, 1);
    assert_eq!(report.per_post[0].responded, 1);
    assert_eq!(report.per_post[0].rate_limited, 0);
    assert_eq!(h.platform.replies().len(), 1);
    assert!(h.processor.governor().is_paused());
}
