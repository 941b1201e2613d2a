//! Response record database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{DispatchError, DispatchOutcome, ResponseRecord, Sentiment};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ResponseDbModel {
    pub id: String,
    pub monitor_id: String,
    pub owner_id: String,
    pub rule_id: Option<String>,
    pub page_id: String,
    pub post_id: String,
    pub comment_id: String,
    pub comment_text: String,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    /// positive, negative, neutral
    pub sentiment: String,
    pub is_spam: bool,
    pub response_text: String,
    pub success: bool,
    pub message_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub latency_ms: i64,
    pub created_at: i64,
    pub expires_at: i64,
}

impl From<&ResponseRecord> for ResponseDbModel {
    fn from(record: &ResponseRecord) -> Self {
        let (success, message_id, error_message, error_code) = match &record.outcome {
            DispatchOutcome::Sent { message_id } => (true, Some(message_id.clone()), None, None),
            DispatchOutcome::Failed(e) => (false, None, Some(e.message.clone()), e.code.clone()),
        };

        Self {
            id: record.id.clone(),
            monitor_id: record.monitor_id.clone(),
            owner_id: record.owner_id.clone(),
            rule_id: record.rule_id.clone(),
            page_id: record.page_id.clone(),
            post_id: record.post_id.clone(),
            comment_id: record.comment_id.clone(),
            comment_text: record.comment_text.clone(),
            author_id: record.author_id.clone(),
            author_name: record.author_name.clone(),
            sentiment: record.sentiment.as_str().to_string(),
            is_spam: record.is_spam,
            response_text: record.response_text.clone(),
            success,
            message_id,
            error_message,
            error_code,
            latency_ms: record.latency_ms.min(i64::MAX as u64) as i64,
            created_at: datetime_to_ms(record.created_at),
            expires_at: datetime_to_ms(record.expires_at),
        }
    }
}

impl From<ResponseDbModel> for ResponseRecord {
    fn from(model: ResponseDbModel) -> Self {
        let outcome = if model.success {
            DispatchOutcome::Sent {
                message_id: model.message_id.unwrap_or_default(),
            }
        } else {
            DispatchOutcome::Failed(DispatchError::new(
                model.error_message.unwrap_or_default(),
                model.error_code,
            ))
        };

        Self {
            id: model.id,
            monitor_id: model.monitor_id,
            owner_id: model.owner_id,
            rule_id: model.rule_id,
            page_id: model.page_id,
            post_id: model.post_id,
            comment_id: model.comment_id,
            comment_text: model.comment_text,
            author_id: model.author_id,
            author_name: model.author_name,
            sentiment: Sentiment::parse(&model.sentiment).unwrap_or_default(),
            is_spam: model.is_spam,
            response_text: model.response_text,
            outcome,
            latency_ms: model.latency_ms.max(0) as u64,
            created_at: ms_to_datetime(model.created_at),
            expires_at: ms_to_datetime(model.expires_at),
        }
    }
}
