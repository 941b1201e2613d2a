//! Monitor database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Error;
use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{AccessToken, Monitor, MonitorStatus};

/// Monitor database model. Nested policy sections are JSON columns.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MonitorDbModel {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub page_id: String,
    pub page_name: String,
    pub page_token: String,
    /// JSON: `PostSelection`
    pub posts: String,
    /// JSON array of rule ids
    pub rule_ids: String,
    pub default_response: String,
    /// JSON: `FilterConfig`
    pub filters: String,
    /// JSON: `ResponseBehavior`
    pub behavior: String,
    /// JSON: `RateLimitSettings`
    pub rate_limit: String,
    /// JSON: `RetentionSettings`
    pub retention: String,
    /// ACTIVE, PAUSED, COMPLETED, FAILED, ARCHIVED
    pub status: String,
    /// JSON: `MonitorStats`
    pub stats: String,
    /// JSON: `LastError`
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_checked_at: Option<i64>,
    pub expires_at: i64,
}

impl MonitorDbModel {
    pub fn from_domain(monitor: &Monitor) -> Result<Self, Error> {
        Ok(Self {
            id: monitor.id.clone(),
            owner_id: monitor.owner_id.clone(),
            name: monitor.name.clone(),
            page_id: monitor.page_id.clone(),
            page_name: monitor.page_name.clone(),
            page_token: monitor.page_token.expose().to_string(),
            posts: serde_json::to_string(&monitor.posts)?,
            rule_ids: serde_json::to_string(&monitor.rule_ids)?,
            default_response: monitor.default_response.clone(),
            filters: serde_json::to_string(&monitor.filters)?,
            behavior: serde_json::to_string(&monitor.behavior)?,
            rate_limit: serde_json::to_string(&monitor.rate_limit)?,
            retention: serde_json::to_string(&monitor.retention)?,
            status: monitor.status.as_str().to_string(),
            stats: serde_json::to_string(&monitor.stats)?,
            last_error: monitor
                .last_error
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            created_at: datetime_to_ms(monitor.created_at),
            updated_at: datetime_to_ms(monitor.updated_at),
            last_checked_at: monitor.last_checked_at.map(datetime_to_ms),
            expires_at: datetime_to_ms(monitor.expires_at),
        })
    }

    pub fn into_domain(self) -> Result<Monitor, Error> {
        let status = MonitorStatus::parse(&self.status).ok_or_else(|| {
            Error::Database(format!(
                "monitor {} has unknown status {}",
                self.id, self.status
            ))
        })?;

        Ok(Monitor {
            posts: serde_json::from_str(&self.posts)?,
            rule_ids: serde_json::from_str(&self.rule_ids)?,
            filters: serde_json::from_str(&self.filters)?,
            behavior: serde_json::from_str(&self.behavior)?,
            rate_limit: serde_json::from_str(&self.rate_limit)?,
            retention: serde_json::from_str(&self.retention)?,
            stats: serde_json::from_str(&self.stats)?,
            last_error: self
                .last_error
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            status,
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            page_id: self.page_id,
            page_name: self.page_name,
            page_token: AccessToken::new(self.page_token),
            default_response: self.default_response,
            created_at: ms_to_datetime(self.created_at),
            updated_at: ms_to_datetime(self.updated_at),
            last_checked_at: self.last_checked_at.map(ms_to_datetime),
            expires_at: ms_to_datetime(self.expires_at),
        })
    }
}
