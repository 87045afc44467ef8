// src/similarity.rs
//! Headline similarity for deduplication: tokenize both headlines, then
//! compare token sets with Jaccard. Token rule: normalized text, punctuation
//! stripped, tokens shorter than 3 chars dropped, stopwords dropped.

use std::collections::HashSet;

use crate::config::DUPLICATE_SIMILARITY_THRESHOLD;
use crate::region::fold_diacritic;

/// Mixed Greek/English stopword list; both languages show up in the feeds.
static STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "for", "from", "in", "into",
    "is", "it", "of", "on", "or", "that", "the", "to", "with", "στη", "στο",
    "στην", "των", "της", "τον", "και", "σε", "απο", "με", "για", "του", "την",
];

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ('\u{0370}'..='\u{03ff}').contains(&c)
}

pub fn tokenize_headline(headline: &str) -> HashSet<String> {
    let folded: String = headline
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(fold_diacritic)
        .map(|c| if is_token_char(c) { c } else { ' ' })
        .collect();

    folded
        .split_whitespace()
        .filter(|token| token.chars().count() >= 3)
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Two headlines with no tokens left after filtering are dissimilar, not
/// duplicates.
pub fn are_likely_duplicate_headlines(left: &str, right: &str) -> bool {
    let left_tokens = tokenize_headline(left);
    let right_tokens = tokenize_headline(right);

    if left_tokens.is_empty() || right_tokens.is_empty() {
        return false;
    }

    jaccard(&left_tokens, &right_tokens) >= DUPLICATE_SIMILARITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_and_short_tokens_dropped() {
        let tokens = tokenize_headline("Fire in the Kolonaki at 5");
        assert!(tokens.contains("fire"));
        assert!(tokens.contains("kolonaki"));
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("in"));
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "Large fire breaks out near Kolonaki apartments";
        let b = "Kolonaki apartments: large fire breaks out";
        assert_eq!(
            are_likely_duplicate_headlines(a, b),
            are_likely_duplicate_headlines(b, a)
        );
        assert!(are_likely_duplicate_headlines(a, b));
    }

    #[test]
    fn unrelated_headlines_are_not_duplicates() {
        assert!(!are_likely_duplicate_headlines(
            "Fire breaks out in Kolonaki",
            "Metro strike planned for Friday"
        ));
    }

    #[test]
    fn empty_token_sets_never_match() {
        // After dropping short tokens and stopwords nothing remains.
        assert!(!are_likely_duplicate_headlines("a in of", "a in of"));
        assert!(!are_likely_duplicate_headlines("", ""));
    }

    #[test]
    fn greek_accents_do_not_break_matching() {
        assert!(are_likely_duplicate_headlines(
            "Πυρκαγιά στην Πεντέλη κοντά σε σπίτια",
            "Πυρκαγια στην Πεντελη κοντα σε σπιτια"
        ));
    }
}
