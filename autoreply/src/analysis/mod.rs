//! Text heuristics over comment bodies.
//!
//! Both classifiers are pure functions over bilingual (English and Arabic)
//! lexicons. Terms are compared case-insensitively; ASCII terms must sit on
//! word boundaries while non-ASCII terms match anywhere, since Arabic attaches
//! clitics directly to words.

pub mod sentiment;
pub mod spam;

pub use sentiment::classify;
pub use spam::is_spam;

/// Number of occurrences of `term` in `haystack`. Both must be lowercase.
pub(crate) fn count_term(haystack: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    if !term.is_ascii() {
        return haystack.matches(term).count();
    }

    haystack
        .match_indices(term)
        .filter(|(start, _)| on_word_boundary(haystack, *start, term.len()))
        .count()
}

pub(crate) fn contains_term(haystack: &str, term: &str) -> bool {
    count_term(haystack, term) > 0
}

/// Whether `haystack[start..start + len]` is bounded by non-word characters.
pub(crate) fn on_word_boundary(haystack: &str, start: usize, len: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[start + len..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_terms_respect_word_boundaries() {
        assert_eq!(count_term("good goods goodness, good!", "good"), 2);
        assert_eq!(count_term("badge", "bad"), 0);
    }

    #[test]
    fn test_non_ascii_terms_match_inside_words() {
        // "and thanks" with a clitic prefix
        assert_eq!(count_term("وشكرا لكم", "شكرا"), 1);
    }
}
