//! Response record repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::ResponseDbModel;
use crate::database::time::datetime_to_ms;
use crate::domain::ResponseRecord;

/// Response record repository trait.
#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Whether a record exists for this comment under this monitor.
    async fn exists(&self, monitor_id: &str, comment_id: &str) -> Result<bool>;
    /// Insert a record. A second record for the same `(monitor_id,
    /// comment_id)` fails with `Error::Conflict`.
    async fn insert(&self, record: &ResponseRecord) -> Result<()>;
    /// Remember that the monitor has seen this comment. True the first time.
    async fn mark_seen(&self, monitor_id: &str, comment_id: &str, now: DateTime<Utc>) -> Result<bool>;
    /// Newest first.
    async fn list_for_monitor(&self, monitor_id: &str, limit: u32) -> Result<Vec<ResponseRecord>>;
    async fn count_for_monitor(&self, monitor_id: &str) -> Result<u64>;
    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64>;
    /// Delete records past their expiry or created before `created_before`.
    async fn delete_expired(&self, now: DateTime<Utc>, created_before: DateTime<Utc>) -> Result<u64>;
    /// Delete the oldest records of a monitor so that at most `keep` remain.
    async fn delete_oldest_beyond(&self, monitor_id: &str, keep: u64) -> Result<u64>;
    /// Delete the monitor's records and seen markers. Returns the number of
    /// records deleted.
    async fn delete_for_monitor(&self, monitor_id: &str) -> Result<u64>;
}

/// SQLx implementation of ResponseRepository.
pub struct SqlxResponseRepository {
    pool: SqlitePool,
}

impl SqlxResponseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResponseRepository for SqlxResponseRepository {
    async fn exists(&self, monitor_id: &str, comment_id: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM responses WHERE monitor_id = ? AND comment_id = ?")
                .bind(monitor_id)
                .bind(comment_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn insert(&self, record: &ResponseRecord) -> Result<()> {
        let r = ResponseDbModel::from(record);
        sqlx::query(
            r#"
            INSERT INTO responses (
                id, monitor_id, owner_id, rule_id, page_id, post_id, comment_id,
                comment_text, author_id, author_name, sentiment, is_spam, response_text,
                success, message_id, error_message, error_code, latency_ms, created_at,
                expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&r.id)
        .bind(&r.monitor_id)
        .bind(&r.owner_id)
        .bind(&r.rule_id)
        .bind(&r.page_id)
        .bind(&r.post_id)
        .bind(&r.comment_id)
        .bind(&r.comment_text)
        .bind(&r.author_id)
        .bind(&r.author_name)
        .bind(&r.sentiment)
        .bind(r.is_spam)
        .bind(&r.response_text)
        .bind(r.success)
        .bind(&r.message_id)
        .bind(&r.error_message)
        .bind(&r.error_code)
        .bind(r.latency_ms)
        .bind(r.created_at)
        .bind(r.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            crate::database::map_unique_violation(e, || {
                format!(
                    "comment {} already has a response under monitor {}",
                    r.comment_id, r.monitor_id
                )
            })
        })?;
        Ok(())
    }

    async fn mark_seen(&self, monitor_id: &str, comment_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO seen_comments (monitor_id, comment_id, first_seen_at) VALUES (?, ?, ?)",
        )
        .bind(monitor_id)
        .bind(comment_id)
        .bind(datetime_to_ms(now))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_for_monitor(&self, monitor_id: &str, limit: u32) -> Result<Vec<ResponseRecord>> {
        let rows = sqlx::query_as::<_, ResponseDbModel>(
            "SELECT * FROM responses WHERE monitor_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(monitor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ResponseRecord::from).collect())
    }

    async fn count_for_monitor(&self, monitor_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE monitor_id = ?")
            .bind(monitor_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE created_at >= ?")
            .bind(datetime_to_ms(since))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>, created_before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM responses WHERE expires_at <= ? OR created_at < ?")
            .bind(datetime_to_ms(now))
            .bind(datetime_to_ms(created_before))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_oldest_beyond(&self, monitor_id: &str, keep: u64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM responses
            WHERE monitor_id = ?
              AND id NOT IN (
                SELECT id FROM responses
                WHERE monitor_id = ?
                ORDER BY created_at DESC, id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(monitor_id)
        .bind(monitor_id)
        .bind(keep.min(i64::MAX as u64) as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_for_monitor(&self, monitor_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM responses WHERE monitor_id = ?")
            .bind(monitor_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM seen_comments WHERE monitor_id = ?")
            .bind(monitor_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
