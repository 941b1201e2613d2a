//! Response rules.

mod schedule;

pub use schedule::ScheduleWindow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Sentiment, SentimentTally};

/// How rule keywords are compared against comment text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMode {
    /// Substring containment.
    #[default]
    Contains,
    /// Whole-word comparison.
    ExactWord,
    /// Each keyword is a regular expression.
    Regex,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::ExactWord => "EXACT_WORD",
            Self::Regex => "REGEX",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONTAINS" => Some(Self::Contains),
            "EXACT_WORD" => Some(Self::ExactWord),
            "REGEX" => Some(Self::Regex),
            _ => None,
        }
    }
}

/// Response lists keyed by sentiment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentResponses {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub neutral: Vec<String>,
}

impl SentimentResponses {
    pub fn for_sentiment(&self, sentiment: Sentiment) -> &[String] {
        match sentiment {
            Sentiment::Positive => &self.positive,
            Sentiment::Negative => &self.negative,
            Sentiment::Neutral => &self.neutral,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleStats {
    pub triggered: u64,
    pub responses_sent: u64,
    pub sentiment: SentimentTally,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

/// A keyword-triggered response policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    /// Evaluated in order; the first hit wins.
    pub keywords: Vec<String>,
    pub responses: Vec<String>,
    pub sentiment_responses: SentimentResponses,
    pub match_mode: MatchMode,
    pub case_sensitive: bool,
    pub min_comment_length: Option<usize>,
    pub max_comment_length: Option<usize>,
    pub apply_to_questions: bool,
    pub apply_to_media: bool,
    pub schedule: ScheduleWindow,
    /// Higher is evaluated first.
    pub priority: i32,
    pub is_active: bool,
    /// Index of the next response in sequential rotation.
    pub rotation_cursor: usize,
    /// JSON object of extra template variables.
    pub custom_variables: Option<String>,
    pub stats: RuleStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            keywords: Vec::new(),
            responses: Vec::new(),
            sentiment_responses: SentimentResponses::default(),
            match_mode: MatchMode::Contains,
            case_sensitive: false,
            min_comment_length: None,
            max_comment_length: None,
            apply_to_questions: true,
            apply_to_media: true,
            schedule: ScheduleWindow::default(),
            priority: 0,
            is_active: true,
            rotation_cursor: 0,
            custom_variables: None,
            stats: RuleStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_responses(mut self, responses: &[&str]) -> Self {
        self.responses = responses.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Account for a rule-driven dispatch attempt.
    pub fn record_trigger(&mut self, success: bool, sentiment: Sentiment, now: DateTime<Utc>) {
        self.stats.triggered += 1;
        self.stats.sentiment.record(sentiment);
        self.stats.last_triggered_at = Some(now);
        if success {
            self.stats.responses_sent += 1;
        }
        self.updated_at = now;
    }
}
