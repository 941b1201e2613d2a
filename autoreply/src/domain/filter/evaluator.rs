//! Monitor-level comment filter.

use serde::{Deserialize, Serialize};

use crate::analysis;
use crate::domain::IncomingComment;
use crate::domain::monitor::FilterConfig;

/// Reason a comment was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterRejection {
    TooShort,
    ExcludedAuthor,
    MissingRequiredTerm,
    ForbiddenTerm,
    Spam,
}

impl FilterRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooShort => "too_short",
            Self::ExcludedAuthor => "excluded_author",
            Self::MissingRequiredTerm => "missing_required_term",
            Self::ForbiddenTerm => "forbidden_term",
            Self::Spam => "spam",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Pass,
    Rejected(FilterRejection),
}

impl FilterVerdict {
    pub fn passes(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Evaluator for monitor filter configuration.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Run the checks in order, stopping at the first failure.
    pub fn evaluate(comment: &IncomingComment, config: &FilterConfig) -> FilterVerdict {
        if comment.char_len() < config.min_length {
            return FilterVerdict::Rejected(FilterRejection::TooShort);
        }

        if let Some(author) = comment.author_id.as_deref()
            && config.excluded_user_ids.iter().any(|id| id == author)
        {
            return FilterVerdict::Rejected(FilterRejection::ExcludedAuthor);
        }

        let lower = comment.text.to_lowercase();
        let present = |term: &String| !term.is_empty() && lower.contains(&term.to_lowercase());

        if !config.must_contain.is_empty() && !config.must_contain.iter().any(present) {
            return FilterVerdict::Rejected(FilterRejection::MissingRequiredTerm);
        }

        if config.must_not_contain.iter().any(present) {
            return FilterVerdict::Rejected(FilterRejection::ForbiddenTerm);
        }

        if config.skip_spam && analysis::is_spam(&comment.text) {
            return FilterVerdict::Rejected(FilterRejection::Spam);
        }

        FilterVerdict::Pass
    }
}
