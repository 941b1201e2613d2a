//! Lexicon-based sentiment classifier.

use super::count_term;
use crate::domain::Sentiment;

const POSITIVE: &[&str] = &[
    "thank", "thanks", "thx", "great", "amazing", "love", "loved", "awesome", "excellent",
    "good", "nice", "beautiful", "perfect", "wonderful", "best", "happy", "fantastic",
    "appreciate", "helpful", "recommend", "cool", "brilliant",
    "شكرا", "شكراً", "مشكور", "رائع", "ممتاز", "جميل", "حلو", "احب", "أحب", "جيد", "تسلم",
    "روعة", "مبدع", "الله يعطيك العافية",
];

const NEGATIVE: &[&str] = &[
    "bad", "terrible", "awful", "hate", "worst", "annoying", "poor", "horrible",
    "disappointed", "disappointing", "angry", "useless", "scam", "broken", "waste",
    "rude", "refund", "fake",
    "سيء", "سيئ", "زفت", "اكره", "أكره", "مزعج", "فاشل", "خايس", "نصب", "احتيال", "سيئة",
];

/// Classify `text` by comparing positive and negative lexicon hits.
/// Ties, including no hits at all, are neutral.
pub fn classify(text: &str) -> Sentiment {
    if text.trim().is_empty() {
        return Sentiment::Neutral;
    }

    let lower = text.to_lowercase();
    let positive = score(&lower, POSITIVE);
    let negative = score(&lower, NEGATIVE);

    if positive > negative {
        Sentiment::Positive
    } else if negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn score(lower: &str, lexicon: &[&str]) -> usize {
    lexicon.iter().map(|term| count_term(lower, term)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("thank you, amazing!", Sentiment::Positive)]
    #[case("this is terrible and annoying", Sentiment::Negative)]
    #[case("ok", Sentiment::Neutral)]
    #[case("", Sentiment::Neutral)]
    #[case("good product but terrible delivery", Sentiment::Neutral)]
    #[case("منتج رائع شكرا", Sentiment::Positive)]
    #[case("خدمة سيئة ومزعج", Sentiment::Negative)]
    fn test_classify(#[case] text: &str, #[case] expected: Sentiment) {
        assert_eq!(classify(text), expected);
    }

    #[test]
    fn test_substrings_of_english_words_do_not_count() {
        // "badge" and "goodbye" carry no sentiment
        assert_eq!(classify("nice badge"), Sentiment::Positive);
        assert_eq!(classify("goodbye"), Sentiment::Neutral);
    }
}
