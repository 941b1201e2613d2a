//! Rule matching.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use tracing::warn;

use crate::analysis::on_word_boundary;
use crate::domain::IncomingComment;
use crate::domain::rule::{MatchMode, Rule};

/// Evaluates comments against an ordered rule set.
pub struct RuleMatcher;

impl RuleMatcher {
    /// Rules matching `comment`, highest priority first. Rules of equal
    /// priority keep their input order.
    pub fn matching<'a>(
        comment: &IncomingComment,
        rules: &'a [Rule],
        now: DateTime<Utc>,
    ) -> Vec<&'a Rule> {
        let mut matched: Vec<&Rule> = rules
            .iter()
            .filter(|rule| Self::is_applicable(rule, comment, now))
            .filter(|rule| Self::keywords_match(rule, &comment.text))
            .collect();
        // sort_by is stable.
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }

    /// The rule that should answer `comment`, if any.
    pub fn best_match<'a>(
        comment: &IncomingComment,
        rules: &'a [Rule],
        now: DateTime<Utc>,
    ) -> Option<&'a Rule> {
        Self::matching(comment, rules, now).into_iter().next()
    }

    fn is_applicable(rule: &Rule, comment: &IncomingComment, now: DateTime<Utc>) -> bool {
        if !rule.is_active || !rule.schedule.contains(now) {
            return false;
        }

        let len = comment.char_len();
        if rule.min_comment_length.is_some_and(|min| len < min)
            || rule.max_comment_length.is_some_and(|max| len > max)
        {
            return false;
        }

        if !rule.apply_to_questions && comment.is_question() {
            return false;
        }

        rule.apply_to_media || !comment.has_media
    }

    fn keywords_match(rule: &Rule, text: &str) -> bool {
        let folded;
        let haystack = if rule.case_sensitive || rule.match_mode == MatchMode::Regex {
            text
        } else {
            folded = text.to_lowercase();
            &folded
        };

        rule.keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|keyword| match rule.match_mode {
                MatchMode::Contains => haystack.contains(&fold(keyword, rule.case_sensitive)),
                MatchMode::ExactWord => {
                    let needle = fold(keyword.trim(), rule.case_sensitive);
                    !needle.is_empty()
                        && haystack
                            .match_indices(needle.as_str())
                            .any(|(start, m)| on_word_boundary(haystack, start, m.len()))
                }
                MatchMode::Regex => {
                    match RegexBuilder::new(keyword)
                        .case_insensitive(!rule.case_sensitive)
                        .size_limit(1 << 20)
                        .build()
                    {
                        Ok(re) => re.is_match(haystack),
                        Err(e) => {
                            warn!(rule_id = %rule.id, pattern = %keyword, error = %e, "Skipping invalid rule pattern");
                            false
                        }
                    }
                }
            })
    }
}

fn fold(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::ScheduleWindow;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // Saturday noon
        Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap()
    }

    fn rule(name: &str, keywords: &[&str]) -> Rule {
        let mut rule = Rule::new("owner", name, now()).with_keywords(keywords);
        rule.id = name.to_string();
        rule
    }

    fn comment(text: &str) -> IncomingComment {
        IncomingComment::new("c1", "p1", text)
    }

    #[test]
    fn test_priority_ties_keep_definition_order() {
        let rules = vec![
            rule("a", &["price"]).with_priority(5),
            rule("b", &["price"]).with_priority(5),
            rule("c", &["price"]).with_priority(1),
            rule("d", &["price"]).with_priority(9),
        ];
        let ids: Vec<_> = RuleMatcher::matching(&comment("price?"), &rules, now())
            .into_iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_first_of_equal_priority_wins() {
        let rules = vec![
            rule("first", &["price"]).with_priority(5),
            rule("second", &["price"]).with_priority(5),
            rule("low", &["price"]).with_priority(1),
        ];
        let best = RuleMatcher::best_match(&comment("what price"), &rules, now());
        assert_eq!(best.map(|r| r.id.as_str()), Some("first"));
    }

    #[test]
    fn test_min_comment_length_blocks_keyword_hit() {
        let mut r = rule("r", &["hi"]);
        r.min_comment_length = Some(10);
        assert!(RuleMatcher::matching(&comment("hi"), &[r], now()).is_empty());
    }

    #[test]
    fn test_max_comment_length() {
        let mut r = rule("r", &["hi"]);
        r.max_comment_length = Some(5);
        assert!(RuleMatcher::matching(&comment("hi there, friend"), &[r.clone()], now()).is_empty());
        assert_eq!(RuleMatcher::matching(&comment("hi!"), &[r], now()).len(), 1);
    }

    #[test]
    fn test_contains_is_case_insensitive_by_default() {
        let rules = vec![rule("r", &["Delivery"])];
        assert_eq!(RuleMatcher::matching(&comment("DELIVERY time?"), &rules, now()).len(), 1);

        let mut strict = rule("s", &["Delivery"]);
        strict.case_sensitive = true;
        assert!(RuleMatcher::matching(&comment("delivery time?"), &[strict], now()).is_empty());
    }

    #[test]
    fn test_exact_word_mode() {
        let rules = vec![rule("r", &["cat"]).with_match_mode(MatchMode::ExactWord)];
        assert!(RuleMatcher::matching(&comment("concatenate"), &rules, now()).is_empty());
        assert_eq!(RuleMatcher::matching(&comment("my Cat, again"), &rules, now()).len(), 1);
    }

    #[test]
    fn test_invalid_regex_is_skipped_not_fatal() {
        let rules = vec![
            rule("r", &["([unclosed", r"\border(ed)?\b"]).with_match_mode(MatchMode::Regex),
        ];
        assert_eq!(RuleMatcher::matching(&comment("I ORDERED twice"), &rules, now()).len(), 1);
        assert!(RuleMatcher::matching(&comment("nothing"), &rules, now()).is_empty());
    }

    #[test]
    fn test_empty_keyword_list_never_matches() {
        let rules = vec![rule("r", &[])];
        assert!(RuleMatcher::matching(&comment("anything"), &rules, now()).is_empty());
    }

    #[test]
    fn test_inactive_questions_media_and_schedule() {
        let mut inactive = rule("inactive", &["x"]);
        inactive.is_active = false;

        let mut no_questions = rule("no_q", &["x"]);
        no_questions.apply_to_questions = false;

        let mut no_media = rule("no_media", &["x"]);
        no_media.apply_to_media = false;

        let mut weekdays = rule("weekdays", &["x"]);
        weekdays.schedule = ScheduleWindow::new(vec!["Monday".to_string()], "09:00", "17:00");

        let rules = vec![inactive, no_questions, no_media, weekdays];
        let question_with_media = comment("x?").with_media();
        assert!(RuleMatcher::matching(&question_with_media, &rules, now()).is_empty());

        let ids: Vec<_> = RuleMatcher::matching(&comment("x"), &rules, now())
            .into_iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["no_q", "no_media"]);
    }
}
