//! String similarity primitives used by the pairwise scorer.

use std::collections::BTreeSet;

/// Jaro-Winkler similarity in [0, 1]: matching window
/// `⌊max(|a|,|b|)/2⌋ − 1`, transpositions halved, prefix boost
/// `0.1 · prefix · (1 − jaro)` over the first up to 4 equal characters.
/// Empty input on either side scores 0.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(a, b)
}

/// Jaccard similarity of two token multisets, compared as sets.
/// Zero when both are empty.
pub fn token_jaccard<S: AsRef<str>>(a: &[S], b: &[S]) -> f64 {
    let set_a: BTreeSet<&str> = a.iter().map(AsRef::as_ref).collect();
    let set_b: BTreeSet<&str> = b.iter().map(AsRef::as_ref).collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

/// Order-free composite name similarity: token overlap dominates, with a
/// sorted-token Jaro-Winkler component to catch near-identical spellings.
pub fn name_order_free_score<S: AsRef<str>>(a_tokens: &[S], b_tokens: &[S]) -> f64 {
    0.7 * token_jaccard(a_tokens, b_tokens)
        + 0.3 * jaro_winkler(&sorted_join(a_tokens), &sorted_join(b_tokens))
}

fn sorted_join<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut sorted: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.join(" ")
}
