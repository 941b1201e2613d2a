//! Rule database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::Error;
use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{MatchMode, Rule};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RuleDbModel {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    /// JSON array
    pub keywords: String,
    /// JSON array
    pub responses: String,
    /// JSON: `SentimentResponses`
    pub sentiment_responses: String,
    /// CONTAINS, EXACT_WORD, REGEX
    pub match_mode: String,
    pub case_sensitive: bool,
    pub min_comment_length: Option<i64>,
    pub max_comment_length: Option<i64>,
    pub apply_to_questions: bool,
    pub apply_to_media: bool,
    /// JSON: `ScheduleWindow`
    pub schedule: String,
    pub priority: i64,
    pub is_active: bool,
    pub rotation_cursor: i64,
    pub custom_variables: Option<String>,
    /// JSON: `RuleStats`
    pub stats: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RuleDbModel {
    pub fn from_domain(rule: &Rule) -> Result<Self, Error> {
        Ok(Self {
            id: rule.id.clone(),
            owner_id: rule.owner_id.clone(),
            name: rule.name.clone(),
            keywords: serde_json::to_string(&rule.keywords)?,
            responses: serde_json::to_string(&rule.responses)?,
            sentiment_responses: serde_json::to_string(&rule.sentiment_responses)?,
            match_mode: rule.match_mode.as_str().to_string(),
            case_sensitive: rule.case_sensitive,
            min_comment_length: rule.min_comment_length.map(|v| v as i64),
            max_comment_length: rule.max_comment_length.map(|v| v as i64),
            apply_to_questions: rule.apply_to_questions,
            apply_to_media: rule.apply_to_media,
            schedule: serde_json::to_string(&rule.schedule)?,
            priority: rule.priority as i64,
            is_active: rule.is_active,
            rotation_cursor: rule.rotation_cursor as i64,
            custom_variables: rule.custom_variables.clone(),
            stats: serde_json::to_string(&rule.stats)?,
            created_at: datetime_to_ms(rule.created_at),
            updated_at: datetime_to_ms(rule.updated_at),
        })
    }

    pub fn into_domain(self) -> Result<Rule, Error> {
        let match_mode = MatchMode::parse(&self.match_mode).ok_or_else(|| {
            Error::Database(format!(
                "rule {} has unknown match mode {}",
                self.id, self.match_mode
            ))
        })?;

        Ok(Rule {
            keywords: serde_json::from_str(&self.keywords)?,
            responses: serde_json::from_str(&self.responses)?,
            sentiment_responses: serde_json::from_str(&self.sentiment_responses)?,
            schedule: serde_json::from_str(&self.schedule)?,
            stats: serde_json::from_str(&self.stats)?,
            match_mode,
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            case_sensitive: self.case_sensitive,
            min_comment_length: self.min_comment_length.map(|v| v.max(0) as usize),
            max_comment_length: self.max_comment_length.map(|v| v.max(0) as usize),
            apply_to_questions: self.apply_to_questions,
            apply_to_media: self.apply_to_media,
            priority: self.priority.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            is_active: self.is_active,
            rotation_cursor: self.rotation_cursor.max(0) as usize,
            custom_variables: self.custom_variables,
            created_at: ms_to_datetime(self.created_at),
            updated_at: ms_to_datetime(self.updated_at),
        })
    }
}
