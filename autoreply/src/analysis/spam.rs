//! Heuristic spam detector.

use super::contains_term;

/// Longest run of one repeated character tolerated.
const MAX_REPEAT_RUN: usize = 4;
/// Shortest all-caps text flagged as shouting.
const MIN_SHOUT_LEN: usize = 11;
/// Share of pictographic characters among non-whitespace characters.
const MAX_EMOJI_RATIO: f64 = 0.2;

const PROMO_TERMS: &[&str] = &[
    "http://", "https://", "www.", ".com", "bit.ly", "buy now", "promo code", "follow me",
    "check my profile", "dm me", "whatsapp", "earn money",
    "تابعني", "اشترك", "واتساب", "رابط", "اربح", "للطلب",
];

const CLICKBAIT_PHRASES: &[&str] = &[
    "click here", "free", "discount", "limited offer",
    "اضغط هنا", "مجانا", "مجاناً", "مجاني", "خصم", "عرض محدود",
];

/// Whether `text` looks like spam. Heuristics are independent and
/// OR-combined.
pub fn is_spam(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }

    is_shouting(text) || has_repeated_run(text) || has_promo(text) || emoji_heavy(text)
}

fn is_shouting(text: &str) -> bool {
    text.chars().count() >= MIN_SHOUT_LEN
        && text.chars().any(|c| c.is_uppercase())
        && !text.chars().any(|c| c.is_lowercase())
}

fn has_repeated_run(text: &str) -> bool {
    let mut run = 0usize;
    let mut prev = None;
    for c in text.chars() {
        if c.is_whitespace() {
            run = 0;
            prev = None;
            continue;
        }
        if prev == Some(c) {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        if run > MAX_REPEAT_RUN {
            return true;
        }
    }
    false
}

fn has_promo(text: &str) -> bool {
    let lower = text.to_lowercase();
    // URL fragments are matched as raw substrings.
    PROMO_TERMS
        .iter()
        .chain(CLICKBAIT_PHRASES)
        .any(|term| {
            if term.starts_with(|c: char| c.is_ascii_alphanumeric())
                && term.ends_with(|c: char| c.is_ascii_alphanumeric())
            {
                contains_term(&lower, term)
            } else {
                lower.contains(term)
            }
        })
}

fn emoji_heavy(text: &str) -> bool {
    let mut visible = 0usize;
    let mut emoji = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        visible += 1;
        if is_pictographic(c) {
            emoji += 1;
        }
    }
    visible > 0 && emoji as f64 / visible as f64 > MAX_EMOJI_RATIO
}

fn is_pictographic(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B00..=0x2BFF | 0x1F1E6..=0x1F1FF)
}
