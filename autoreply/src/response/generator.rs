//! Response selection and rendering.

use chrono::{DateTime, Utc};

use super::template::TemplateVars;
use crate::analysis;
use crate::domain::{IncomingComment, Monitor, Rule, Sentiment};
use crate::limits::MAX_RESPONSE_CHARS;

/// Reply used when neither a rule nor the monitor provides one.
pub const FALLBACK_RESPONSE: &str = "Thank you for your comment!";

const ELLIPSIS: &str = "...";

/// New rotation cursor for a rule; the caller persists it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationUpdate {
    pub rule_id: String,
    pub cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedResponse {
    pub text: String,
    pub sentiment: Sentiment,
    pub rotation: Option<RotationUpdate>,
}

/// Build the reply for `comment`. Pure apart from the random pick.
pub fn generate(
    comment: &IncomingComment,
    rule: Option<&Rule>,
    monitor: &Monitor,
    now: DateTime<Utc>,
) -> GeneratedResponse {
    let sentiment = analysis::classify(&comment.text);

    let (raw, rotation) = match rule {
        Some(rule) => {
            let pool = response_pool(rule, sentiment, monitor.behavior.sentiment_aware);
            match select(pool, rule.rotation_cursor, monitor.behavior.randomize) {
                Some((text, cursor)) => (
                    text.to_string(),
                    cursor.map(|cursor| RotationUpdate {
                        rule_id: rule.id.clone(),
                        cursor,
                    }),
                ),
                None => (monitor_default(monitor), None),
            }
        }
        None => (monitor_default(monitor), None),
    };

    let text = if monitor.behavior.custom_template {
        let mut vars = TemplateVars::new()
            .set("comment", comment.text.as_str())
            .set("name", comment.author_name.as_deref().unwrap_or(""))
            .set("page", monitor.page_name.as_str())
            .set("time", now.format("%H:%M").to_string());
        if let Some(rule) = rule
            && let Some(json) = rule.custom_variables.as_deref()
        {
            vars = vars.merge_json(json, &rule.id);
        }
        vars.render(&raw)
    } else {
        raw
    };

    GeneratedResponse {
        text: truncate(&text),
        sentiment,
        rotation,
    }
}

/// Sentiment-specific list when enabled and non-empty, otherwise the
/// general list.
fn response_pool(rule: &Rule, sentiment: Sentiment, sentiment_aware: bool) -> &[String] {
    if sentiment_aware {
        let specific = rule.sentiment_responses.for_sentiment(sentiment);
        if !specific.is_empty() {
            return specific;
        }
    }
    &rule.responses
}

/// Pick from `pool`. Sequential selection returns the advanced cursor.
fn select(pool: &[String], cursor: usize, randomize: bool) -> Option<(&str, Option<usize>)> {
    if pool.is_empty() {
        return None;
    }
    let len = pool.len();
    if randomize {
        let index = (rand::random::<u64>() % len as u64) as usize;
        return Some((&pool[index], None));
    }
    let index = cursor % len;
    Some((&pool[index], Some((index + 1) % len)))
}

fn monitor_default(monitor: &Monitor) -> String {
    if monitor.default_response.trim().is_empty() {
        FALLBACK_RESPONSE.to_string()
    } else {
        monitor.default_response.clone()
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_RESPONSE_CHARS {
        return text.to_string();
    }
    let keep = MAX_RESPONSE_CHARS - ELLIPSIS.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
