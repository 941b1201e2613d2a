//! Monitor repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::MonitorDbModel;
use crate::database::time::datetime_to_ms;
use crate::domain::monitor::{MonitorProgress, PostSelection};
use crate::domain::{Monitor, MonitorStatus};
use crate::{Error, Result};

/// Monitor repository trait.
#[async_trait]
pub trait MonitorRepository: Send + Sync {
    async fn find_monitor(&self, id: &str) -> Result<Option<Monitor>>;
    async fn list_monitors(&self) -> Result<Vec<Monitor>>;
    async fn list_by_status(&self, status: MonitorStatus) -> Result<Vec<Monitor>>;
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Monitor>>;
    async fn count_by_owner_and_status(&self, owner_id: &str, status: MonitorStatus) -> Result<u64>;
    async fn create_monitor(&self, monitor: &Monitor) -> Result<()>;
    /// Replace the stored monitor. Errors with `NotFound` if it is gone.
    async fn update_monitor(&self, monitor: &Monitor) -> Result<()>;
    /// Write back pass progress without touching status or configuration.
    /// Errors with `NotFound` if the monitor is gone.
    async fn update_progress(&self, id: &str, progress: &MonitorProgress) -> Result<()>;
    async fn update_status(&self, id: &str, status: MonitorStatus, now: DateTime<Utc>) -> Result<()>;
    async fn delete_monitor(&self, id: &str) -> Result<()>;

    async fn get_monitor(&self, id: &str) -> Result<Monitor> {
        self.find_monitor(id)
            .await?
            .ok_or_else(|| Error::not_found("Monitor", id))
    }

    /// Active monitors referencing `rule_id`.
    async fn list_active_referencing_rule(&self, rule_id: &str) -> Result<Vec<Monitor>> {
        Ok(self
            .list_by_status(MonitorStatus::Active)
            .await?
            .into_iter()
            .filter(|m| m.rule_ids.iter().any(|id| id == rule_id))
            .collect())
    }
}

/// SQLx implementation of MonitorRepository.
pub struct SqlxMonitorRepository {
    pool: SqlitePool,
}

impl SqlxMonitorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn into_domain_all(rows: Vec<MonitorDbModel>) -> Result<Vec<Monitor>> {
    rows.into_iter().map(MonitorDbModel::into_domain).collect()
}

#[async_trait]
impl MonitorRepository for SqlxMonitorRepository {
    async fn find_monitor(&self, id: &str) -> Result<Option<Monitor>> {
        sqlx::query_as::<_, MonitorDbModel>("SELECT * FROM monitors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(MonitorDbModel::into_domain)
            .transpose()
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>> {
        let rows =
            sqlx::query_as::<_, MonitorDbModel>("SELECT * FROM monitors ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        into_domain_all(rows)
    }

    async fn list_by_status(&self, status: MonitorStatus) -> Result<Vec<Monitor>> {
        let rows = sqlx::query_as::<_, MonitorDbModel>(
            "SELECT * FROM monitors WHERE status = ? ORDER BY created_at",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        into_domain_all(rows)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Monitor>> {
        let rows = sqlx::query_as::<_, MonitorDbModel>(
            "SELECT * FROM monitors WHERE owner_id = ? ORDER BY created_at",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        into_domain_all(rows)
    }

    async fn count_by_owner_and_status(&self, owner_id: &str, status: MonitorStatus) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM monitors WHERE owner_id = ? AND status = ?")
                .bind(owner_id)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn create_monitor(&self, monitor: &Monitor) -> Result<()> {
        let m = MonitorDbModel::from_domain(monitor)?;
        sqlx::query(
            r#"
            INSERT INTO monitors (
                id, owner_id, name, page_id, page_name, page_token, posts, rule_ids,
                default_response, filters, behavior, rate_limit, retention, status, stats,
                last_error, created_at, updated_at, last_checked_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&m.id)
        .bind(&m.owner_id)
        .bind(&m.name)
        .bind(&m.page_id)
        .bind(&m.page_name)
        .bind(&m.page_token)
        .bind(&m.posts)
        .bind(&m.rule_ids)
        .bind(&m.default_response)
        .bind(&m.filters)
        .bind(&m.behavior)
        .bind(&m.rate_limit)
        .bind(&m.retention)
        .bind(&m.status)
        .bind(&m.stats)
        .bind(&m.last_error)
        .bind(m.created_at)
        .bind(m.updated_at)
        .bind(m.last_checked_at)
        .bind(m.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            crate::database::map_unique_violation(e, || format!("monitor {} already exists", m.id))
        })?;
        Ok(())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<()> {
        let m = MonitorDbModel::from_domain(monitor)?;
        let result = sqlx::query(
            r#"
            UPDATE monitors SET
                owner_id = ?,
                name = ?,
                page_id = ?,
                page_name = ?,
                page_token = ?,
                posts = ?,
                rule_ids = ?,
                default_response = ?,
                filters = ?,
                behavior = ?,
                rate_limit = ?,
                retention = ?,
                status = ?,
                stats = ?,
                last_error = ?,
                updated_at = ?,
                last_checked_at = ?,
                expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&m.owner_id)
        .bind(&m.name)
        .bind(&m.page_id)
        .bind(&m.page_name)
        .bind(&m.page_token)
        .bind(&m.posts)
        .bind(&m.rule_ids)
        .bind(&m.default_response)
        .bind(&m.filters)
        .bind(&m.behavior)
        .bind(&m.rate_limit)
        .bind(&m.retention)
        .bind(&m.status)
        .bind(&m.stats)
        .bind(&m.last_error)
        .bind(m.updated_at)
        .bind(m.last_checked_at)
        .bind(m.expires_at)
        .bind(&m.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Monitor", &m.id));
        }
        Ok(())
    }

    async fn update_progress(&self, id: &str, progress: &MonitorProgress) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Checkpoints live inside the posts JSON, next to the owner's selection.
        let posts: Option<String> = sqlx::query_scalar("SELECT posts FROM monitors WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(posts) = posts else {
            return Err(Error::not_found("Monitor", id));
        };
        let mut selection: PostSelection = serde_json::from_str(&posts)?;
        for (post_id, at) in &progress.post_checks {
            selection.mark_checked(post_id, *at);
        }

        let last_error = progress
            .last_error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r#"
            UPDATE monitors SET
                posts = ?,
                stats = ?,
                last_error = ?,
                last_checked_at = COALESCE(?, last_checked_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(&selection)?)
        .bind(serde_json::to_string(&progress.stats)?)
        .bind(last_error)
        .bind(progress.last_checked_at.map(datetime_to_ms))
        .bind(datetime_to_ms(progress.updated_at))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_status(&self, id: &str, status: MonitorStatus, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE monitors SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(datetime_to_ms(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Monitor", id));
        }
        Ok(())
    }

    async fn delete_monitor(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM monitors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
