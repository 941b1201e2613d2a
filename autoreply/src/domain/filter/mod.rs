//! Comment filtering and rule matching.

mod evaluator;
mod matcher;

pub use evaluator::{FilterEvaluator, FilterRejection, FilterVerdict};
pub use matcher::RuleMatcher;
