//! Repository tests against an in-memory SQLite database with the real schema.

use chrono::{DateTime, TimeZone, Utc};

use autoreply::Error;
use autoreply::database::repositories::{
    MonitorRepository, OwnerDirectory, ResponseRepository, RuleRepository, SqlxMonitorRepository,
    SqlxOwnerDirectory, SqlxResponseRepository, SqlxRuleRepository,
};
use autoreply::database::{DbPool, init_memory_pool, run_migrations};
use autoreply::domain::{
    AccessToken, DispatchError, DispatchOutcome, MatchMode, Monitor, MonitorStatus,
    ResponseRecord, Rule, ScheduleWindow, Sentiment, SubscriptionTier,
};

async fn setup_test_db() -> DbPool {
    let pool = init_memory_pool()
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
}

fn monitor(id: &str, owner: &str) -> Monitor {
    let mut m = Monitor::new(owner, "spring sale", "page-1", AccessToken::new("tok"), now())
        .with_posts(&["post-1", "post-2"]);
    m.id = id.to_string();
    m
}

fn record(monitor_id: &str, comment_id: &str, created_at: DateTime<Utc>) -> ResponseRecord {
    ResponseRecord {
        id: uuid::Uuid::new_v4().to_string(),
        monitor_id: monitor_id.to_string(),
        owner_id: "owner-1".to_string(),
        rule_id: Some("rule-1".to_string()),
        page_id: "page-1".to_string(),
        post_id: "post-1".to_string(),
        comment_id: comment_id.to_string(),
        comment_text: "how much?".to_string(),
        author_id: Some("user-1".to_string()),
        author_name: Some("Sam".to_string()),
        sentiment: Sentiment::Neutral,
        is_spam: false,
        response_text: "DM us".to_string(),
        outcome: DispatchOutcome::Sent {
            message_id: format!("reply-{}", comment_id),
        },
        latency_ms: 120,
        created_at,
        expires_at: created_at + chrono::Duration::days(3),
    }
}

mod schema_tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = setup_test_db().await;
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .expect("Failed to query tables");
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();

        for table in ["monitors", "owners", "responses", "rules", "seen_comments"] {
            assert!(names.contains(&table), "{} table missing", table);
        }
    }
}

mod monitor_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_monitor_configuration_survives_storage() {
        let repo = SqlxMonitorRepository::new(setup_test_db().await);
        let mut m = monitor("m1", "owner-1");
        m.filters.must_not_contain = vec!["refund".to_string()];
        m.behavior.sentiment_aware = true;
        m.rate_limit.max_responses_per_hour = 12;
        m.stats.comments_found = 7;
        m.record_error("boom", Some("190".to_string()), now());
        repo.create_monitor(&m).await.unwrap();

        let stored = repo.get_monitor("m1").await.unwrap();
        assert_eq!(stored.filters.must_not_contain, vec!["refund".to_string()]);
        assert!(stored.behavior.sentiment_aware);
        assert_eq!(stored.rate_limit.max_responses_per_hour, 12);
        assert_eq!(stored.stats.comments_found, 7);
        assert_eq!(stored.posts.posts.len(), 2);
        assert_eq!(stored.page_token.expose(), "tok");
        assert_eq!(stored.last_error.and_then(|e| e.code), Some("190".to_string()));
        assert_eq!(stored.created_at, now());
    }

    #[tokio::test]
    async fn test_status_queries() {
        let repo = SqlxMonitorRepository::new(setup_test_db().await);
        for id in ["m1", "m2", "m3"] {
            repo.create_monitor(&monitor(id, "owner-1")).await.unwrap();
        }
        repo.create_monitor(&monitor("m4", "owner-2")).await.unwrap();
        repo.update_status("m2", MonitorStatus::Paused, now())
            .await
            .unwrap();

        assert_eq!(
            repo.count_by_owner_and_status("owner-1", MonitorStatus::Active)
                .await
                .unwrap(),
            2
        );
        assert_eq!(repo.list_by_status(MonitorStatus::Active).await.unwrap().len(), 3);
        assert_eq!(repo.list_by_owner("owner-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_write_keeps_status_and_configuration() {
        let repo = SqlxMonitorRepository::new(setup_test_db().await);
        let mut pass_copy = monitor("m1", "owner-1");
        repo.create_monitor(&pass_copy).await.unwrap();

        // Owner edits while a pass holds the old copy.
        let mut edited = pass_copy.clone();
        edited.filters.min_length = 8;
        edited.posts.posts.push(autoreply::domain::monitor::MonitoredPost::new("post-3"));
        repo.update_monitor(&edited).await.unwrap();
        repo.update_status("m1", MonitorStatus::Paused, now())
            .await
            .unwrap();

        pass_copy.stats.responses_sent = 4;
        pass_copy.record_error("boom", Some("1".to_string()), now());
        pass_copy.mark_post_checked("post-2", now());
        pass_copy.last_checked_at = Some(now());
        repo.update_progress("m1", &pass_copy.progress())
            .await
            .unwrap();

        let stored = repo.get_monitor("m1").await.unwrap();
        assert_eq!(stored.status, MonitorStatus::Paused);
        assert_eq!(stored.filters.min_length, 8);
        assert_eq!(stored.posts.posts.len(), 3);
        assert_eq!(stored.posts.posts[1].last_checked_at, Some(now()));
        assert_eq!(stored.posts.posts[2].last_checked_at, None);
        assert_eq!(stored.stats.responses_sent, 4);
        assert_eq!(stored.stats.errors, 1);
        assert_eq!(stored.last_checked_at, Some(now()));

        let err = repo
            .update_progress("ghost", &pass_copy.progress())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_of_missing_monitor_is_not_found() {
        let repo = SqlxMonitorRepository::new(setup_test_db().await);
        let err = repo.update_monitor(&monitor("ghost", "owner-1")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}

mod rule_repository_tests {
    use super::*;

    fn rule(id: &str) -> Rule {
        let mut r = Rule::new("owner-1", id, now())
            .with_keywords(&["price", "cost"])
            .with_responses(&["DM us", "Check your inbox"])
            .with_match_mode(MatchMode::ExactWord);
        r.id = id.to_string();
        r
    }

    #[tokio::test]
    async fn test_rules_are_returned_in_requested_order() {
        let repo = SqlxRuleRepository::new(setup_test_db().await);
        for id in ["a", "b", "c"] {
            repo.create_rule(&rule(id)).await.unwrap();
        }

        let ids = vec!["c".to_string(), "missing".to_string(), "a".to_string()];
        let rules = repo.get_rules(&ids).await.unwrap();
        let got: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_schedule_rotation_and_stats_persist() {
        let repo = SqlxRuleRepository::new(setup_test_db().await);
        let mut r = rule("a");
        r.schedule = ScheduleWindow::new(vec!["mon".to_string()], "22:00", "02:00")
            .with_timezone("Europe/Paris");
        r.custom_variables = Some(r#"{"shop":"Corner"}"#.to_string());
        repo.create_rule(&r).await.unwrap();

        repo.update_rotation("a", 1, now()).await.unwrap();
        r.record_trigger(true, Sentiment::Positive, now());
        repo.update_stats("a", &r.stats, now()).await.unwrap();

        let stored = repo.get_rule("a").await.unwrap();
        assert_eq!(stored.match_mode, MatchMode::ExactWord);
        assert_eq!(stored.schedule.timezone.as_deref(), Some("Europe/Paris"));
        assert_eq!(stored.rotation_cursor, 1);
        assert_eq!(stored.stats.triggered, 1);
        assert_eq!(stored.stats.sentiment.positive, 1);
        assert_eq!(stored.custom_variables, r.custom_variables);
    }
}

mod response_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_comment_per_monitor_conflicts() {
        let repo = SqlxResponseRepository::new(setup_test_db().await);
        repo.insert(&record("m1", "c1", now())).await.unwrap();

        let err = repo.insert(&record("m1", "c1", now())).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Another monitor may answer the same comment.
        repo.insert(&record("m2", "c1", now())).await.unwrap();
        assert!(repo.exists("m1", "c1").await.unwrap());
        assert!(!repo.exists("m1", "c2").await.unwrap());
    }

    #[tokio::test]
    async fn test_comment_is_seen_once_per_monitor() {
        let repo = SqlxResponseRepository::new(setup_test_db().await);
        assert!(repo.mark_seen("m1", "c1", now()).await.unwrap());
        assert!(!repo.mark_seen("m1", "c1", now()).await.unwrap());
        assert!(repo.mark_seen("m2", "c1", now()).await.unwrap());

        repo.delete_for_monitor("m1").await.unwrap();
        assert!(repo.mark_seen("m1", "c1", now()).await.unwrap());
        assert!(!repo.mark_seen("m2", "c1", now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_outcome_is_stored() {
        let repo = SqlxResponseRepository::new(setup_test_db().await);
        let mut failed = record("m1", "c1", now());
        failed.outcome =
            DispatchOutcome::Failed(DispatchError::new("rate limited", Some("4".to_string())));
        repo.insert(&failed).await.unwrap();

        let stored = repo.list_for_monitor("m1", 10).await.unwrap();
        assert_eq!(stored[0].outcome, failed.outcome);
        assert!(!stored[0].succeeded());
    }

    #[tokio::test]
    async fn test_oldest_records_beyond_cap_are_deleted() {
        let repo = SqlxResponseRepository::new(setup_test_db().await);
        for n in 0..130 {
            let created = now() + chrono::Duration::seconds(n);
            repo.insert(&record("m1", &format!("c{}", n), created))
                .await
                .unwrap();
        }
        repo.insert(&record("m2", "c0", now())).await.unwrap();

        assert_eq!(repo.delete_oldest_beyond("m1", 100).await.unwrap(), 30);
        assert_eq!(repo.count_for_monitor("m1").await.unwrap(), 100);
        assert_eq!(repo.count_for_monitor("m2").await.unwrap(), 1);

        let newest_first = repo.list_for_monitor("m1", 200).await.unwrap();
        assert_eq!(newest_first.first().map(|r| r.comment_id.as_str()), Some("c129"));
        assert_eq!(newest_first.last().map(|r| r.comment_id.as_str()), Some("c30"));
    }

    #[tokio::test]
    async fn test_expired_and_recent_counts() {
        let repo = SqlxResponseRepository::new(setup_test_db().await);
        repo.insert(&record("m1", "fresh", now())).await.unwrap();
        let mut stale = record("m1", "stale", now() - chrono::Duration::days(4));
        stale.expires_at = now() - chrono::Duration::days(1);
        repo.insert(&stale).await.unwrap();

        assert_eq!(
            repo.count_created_since(now() - chrono::Duration::minutes(1))
                .await
                .unwrap(),
            1
        );
        let deleted = repo
            .delete_expired(now(), now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.delete_for_monitor("m1").await.unwrap(), 1);
    }
}

mod owner_directory_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_owner_gets_default_tier() {
        let owners = SqlxOwnerDirectory::new(setup_test_db().await, SubscriptionTier::Basic);
        assert_eq!(
            owners.subscription_tier("nobody").await.unwrap(),
            SubscriptionTier::Basic
        );

        owners
            .set_tier("owner-1", SubscriptionTier::Business)
            .await
            .unwrap();
        assert_eq!(
            owners.subscription_tier("owner-1").await.unwrap(),
            SubscriptionTier::Business
        );
        assert_eq!(
            SubscriptionTier::Business.active_monitor_quota(),
            10
        );
    }
}
