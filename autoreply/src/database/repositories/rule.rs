//! Rule repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::RuleDbModel;
use crate::database::time::datetime_to_ms;
use crate::domain::Rule;
use crate::domain::rule::RuleStats;
use crate::{Error, Result};

/// Rule repository trait.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn find_rule(&self, id: &str) -> Result<Option<Rule>>;
    /// Rules for `ids`, in the order given. Unknown ids are skipped.
    async fn get_rules(&self, ids: &[String]) -> Result<Vec<Rule>>;
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Rule>>;
    async fn create_rule(&self, rule: &Rule) -> Result<()>;
    async fn update_rule(&self, rule: &Rule) -> Result<()>;
    async fn delete_rule(&self, id: &str) -> Result<()>;
    /// Persist a new rotation cursor.
    async fn update_rotation(&self, id: &str, cursor: usize, now: DateTime<Utc>) -> Result<()>;
    async fn update_stats(&self, id: &str, stats: &RuleStats, now: DateTime<Utc>) -> Result<()>;

    async fn get_rule(&self, id: &str) -> Result<Rule> {
        self.find_rule(id)
            .await?
            .ok_or_else(|| Error::not_found("Rule", id))
    }
}

/// SQLx implementation of RuleRepository.
pub struct SqlxRuleRepository {
    pool: SqlitePool,
}

impl SqlxRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleRepository for SqlxRuleRepository {
    async fn find_rule(&self, id: &str) -> Result<Option<Rule>> {
        sqlx::query_as::<_, RuleDbModel>("SELECT * FROM rules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(RuleDbModel::into_domain)
            .transpose()
    }

    async fn get_rules(&self, ids: &[String]) -> Result<Vec<Rule>> {
        let mut rules = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rule) = self.find_rule(id).await? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Rule>> {
        sqlx::query_as::<_, RuleDbModel>(
            "SELECT * FROM rules WHERE owner_id = ? ORDER BY priority DESC, created_at",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(RuleDbModel::into_domain)
        .collect()
    }

    async fn create_rule(&self, rule: &Rule) -> Result<()> {
        let r = RuleDbModel::from_domain(rule)?;
        sqlx::query(
            r#"
            INSERT INTO rules (
                id, owner_id, name, keywords, responses, sentiment_responses, match_mode,
                case_sensitive, min_comment_length, max_comment_length, apply_to_questions,
                apply_to_media, schedule, priority, is_active, rotation_cursor,
                custom_variables, stats, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&r.id)
        .bind(&r.owner_id)
        .bind(&r.name)
        .bind(&r.keywords)
        .bind(&r.responses)
        .bind(&r.sentiment_responses)
        .bind(&r.match_mode)
        .bind(r.case_sensitive)
        .bind(r.min_comment_length)
        .bind(r.max_comment_length)
        .bind(r.apply_to_questions)
        .bind(r.apply_to_media)
        .bind(&r.schedule)
        .bind(r.priority)
        .bind(r.is_active)
        .bind(r.rotation_cursor)
        .bind(&r.custom_variables)
        .bind(&r.stats)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            crate::database::map_unique_violation(e, || format!("rule {} already exists", r.id))
        })?;
        Ok(())
    }

    async fn update_rule(&self, rule: &Rule) -> Result<()> {
        let r = RuleDbModel::from_domain(rule)?;
        let result = sqlx::query(
            r#"
            UPDATE rules SET
                owner_id = ?,
                name = ?,
                keywords = ?,
                responses = ?,
                sentiment_responses = ?,
                match_mode = ?,
                case_sensitive = ?,
                min_comment_length = ?,
                max_comment_length = ?,
                apply_to_questions = ?,
                apply_to_media = ?,
                schedule = ?,
                priority = ?,
                is_active = ?,
                rotation_cursor = ?,
                custom_variables = ?,
                stats = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&r.owner_id)
        .bind(&r.name)
        .bind(&r.keywords)
        .bind(&r.responses)
        .bind(&r.sentiment_responses)
        .bind(&r.match_mode)
        .bind(r.case_sensitive)
        .bind(r.min_comment_length)
        .bind(r.max_comment_length)
        .bind(r.apply_to_questions)
        .bind(r.apply_to_media)
        .bind(&r.schedule)
        .bind(r.priority)
        .bind(r.is_active)
        .bind(r.rotation_cursor)
        .bind(&r.custom_variables)
        .bind(&r.stats)
        .bind(r.updated_at)
        .bind(&r.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Rule", &r.id));
        }
        Ok(())
    }

    async fn delete_rule(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_rotation(&self, id: &str, cursor: usize, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE rules SET rotation_cursor = ?, updated_at = ? WHERE id = ?")
            .bind(cursor as i64)
            .bind(datetime_to_ms(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_stats(&self, id: &str, stats: &RuleStats, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE rules SET stats = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(stats)?)
            .bind(datetime_to_ms(now))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
