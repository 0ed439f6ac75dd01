//! Pairwise scorer: domain rules first, weighted component sum as fallback.
//!
//! The lineage rules are an ordered list of independently testable functions;
//! scoring a pair is a fold over that list. Each rule either produces a hit
//! or declines; a rule that cannot apply (missing tokens, short names)
//! declines silently and evaluation falls through.

use crate::config::DedupeConfig;
use crate::model::{Reason, Record, ScoreBreakdown};
use crate::similarity::{jaro_winkler, name_order_free_score, token_jaccard};

/// Threshold tiers shared by the lineage rules.
const STRONG_TOKEN: f64 = 0.93;
const STRONG_NAME: f64 = 0.95;

/// Fixed score for a verified national-id match.
const EXACT_ID_SCORE: f64 = 0.99;
/// Fixed score for the polygamous-household pattern.
const POLYGAMY_SCORE: f64 = 0.97;

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reasons: Vec<Reason>,
}

#[derive(Debug, Clone)]
struct RuleHit {
    score: f64,
    reasons: Vec<Reason>,
}

type LineageRule = fn(&Record, &Record, &DedupeConfig) -> Option<RuleHit>;

/// Domain rules tried in order after the two short-circuits; the first hit
/// wins and the weighted sum never runs.
const LINEAGE_RULES: &[LineageRule] = &[
    token_reorder_rule,
    household_children_rule,
    woman_lineage_rule,
    mixed_generation_rule,
    full_lineage_rule,
];

/// Score a record pair. Pure: never mutates its inputs, and symmetric in
/// them, so `score_pair(a, b) == score_pair(b, a)`.
pub fn score_pair(a: &Record, b: &Record, config: &DedupeConfig) -> ScoreOutcome {
    if let Some(hit) = exact_id_rule(a, b) {
        return outcome(hit);
    }
    if let Some(hit) = polygamy_rule(a, b, config) {
        return outcome(hit);
    }
    for rule in LINEAGE_RULES {
        if let Some(hit) = rule(a, b, config) {
            return outcome(hit);
        }
    }
    weighted_sum(a, b, config)
}

fn outcome(hit: RuleHit) -> ScoreOutcome {
    ScoreOutcome {
        score: hit.score,
        breakdown: ScoreBreakdown::default(),
        reasons: hit.reasons,
    }
}

fn first(tokens: &[String]) -> &str {
    tokens.first().map(String::as_str).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Short-circuit rules
// ---------------------------------------------------------------------------

/// Both national ids present (digit form) and equal.
fn exact_id_rule(a: &Record, b: &Record) -> Option<RuleHit> {
    if !a.id_digits.is_empty() && a.id_digits == b.id_digits {
        return Some(RuleHit {
            score: EXACT_ID_SCORE,
            reasons: vec![Reason::ExactId],
        });
    }
    None
}

/// Same husband, women sharing father and grandfather tokens but differing
/// in their own first name: the classic polygamous-household shape.
fn polygamy_rule(a: &Record, b: &Record, config: &DedupeConfig) -> Option<RuleHit> {
    if !config.rules.enable_polygamy_rules {
        return None;
    }
    let husband = jaro_winkler(&a.husband_name_normalized, &b.husband_name_normalized);
    if husband < STRONG_NAME {
        return None;
    }
    let father = jaro_winkler(a.woman_tokens.get(1)?, b.woman_tokens.get(1)?);
    let grandfather = jaro_winkler(a.woman_tokens.get(2)?, b.woman_tokens.get(2)?);
    if father >= STRONG_TOKEN && grandfather >= 0.90 {
        return Some(RuleHit {
            score: POLYGAMY_SCORE,
            reasons: vec![Reason::PolygamyPattern],
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Lineage rules (each scores min(1, minPair + delta))
// ---------------------------------------------------------------------------

fn lineage_hit(config: &DedupeConfig, delta: f64, reason: Reason) -> Option<RuleHit> {
    Some(RuleHit {
        score: (config.thresholds.min_pair + delta).min(1.0),
        reasons: vec![reason],
    })
}

/// Same woman-name tokens in a different order.
fn token_reorder_rule(a: &Record, b: &Record, config: &DedupeConfig) -> Option<RuleHit> {
    if token_jaccard(&a.woman_tokens, &b.woman_tokens) >= 0.80 {
        return lineage_hit(config, 0.22, Reason::TokenReorder);
    }
    None
}

/// Strong first-name and husband agreement backed by a near-identical
/// children list.
fn household_children_rule(a: &Record, b: &Record, config: &DedupeConfig) -> Option<RuleHit> {
    let first_name = jaro_winkler(first(&a.woman_tokens), first(&b.woman_tokens));
    if first_name < STRONG_TOKEN {
        return None;
    }
    let husband = jaro_winkler(&a.husband_name_normalized, &b.husband_name_normalized)
        .max(name_order_free_score(&a.husband_tokens, &b.husband_tokens));
    if husband < 0.90 {
        return None;
    }
    if token_jaccard(&a.children_normalized, &b.children_normalized) >= 0.90 {
        return lineage_hit(config, 0.25, Reason::DuplicatedHusbandLineage);
    }
    None
}

/// The woman's own four-part lineage matches (3-of-4 or better) while the
/// husbands clearly differ: same woman registered under two husbands.
fn woman_lineage_rule(a: &Record, b: &Record, config: &DedupeConfig) -> Option<RuleHit> {
    if a.woman_tokens.len() < 4 || b.woman_tokens.len() < 4 {
        return None;
    }
    let matched = (0..4)
        .filter(|&i| jaro_winkler(&a.woman_tokens[i], &b.woman_tokens[i]) >= STRONG_TOKEN)
        .count();
    if matched < 3 {
        return None;
    }
    let husband_first = jaro_winkler(first(&a.husband_tokens), first(&b.husband_tokens));
    if husband_first < 0.70 {
        return lineage_hit(config, 0.18, Reason::WomanLineageMatch);
    }
    None
}

/// One registration carries an extra middle name: a 4-token and a 5-token
/// rendering of the same woman, where the 4-token lineage re-aligns one
/// position later in the 5-token name. Requires a strong husband first name.
fn mixed_generation_rule(a: &Record, b: &Record, config: &DedupeConfig) -> Option<RuleHit> {
    let (short, long) = match (a.woman_tokens.len(), b.woman_tokens.len()) {
        (4, 5) => (&a.woman_tokens, &b.woman_tokens),
        (5, 4) => (&b.woman_tokens, &a.woman_tokens),
        _ => return None,
    };
    let husband_first = jaro_winkler(first(&a.husband_tokens), first(&b.husband_tokens));
    if husband_first < STRONG_NAME {
        return None;
    }
    if jaro_winkler(&short[0], &long[0]) < STRONG_TOKEN {
        return None;
    }
    // Father position must disagree in place but re-align one slot later.
    if jaro_winkler(&short[1], &long[1]) >= STRONG_TOKEN {
        return None;
    }
    if jaro_winkler(&short[1], &long[2]) >= STRONG_TOKEN
        && jaro_winkler(&short[2], &long[3]) >= STRONG_TOKEN
    {
        return lineage_hit(config, 0.20, Reason::DuplicatedHusbandLineage);
    }
    None
}

/// Full four-part woman lineage and full husband identity both strong.
fn full_lineage_rule(a: &Record, b: &Record, config: &DedupeConfig) -> Option<RuleHit> {
    if a.woman_tokens.len() < 4 || b.woman_tokens.len() < 4 {
        return None;
    }
    let all_strong = (0..4)
        .all(|i| jaro_winkler(&a.woman_tokens[i], &b.woman_tokens[i]) >= STRONG_TOKEN);
    if !all_strong {
        return None;
    }
    let husband = jaro_winkler(&a.husband_name_normalized, &b.husband_name_normalized);
    if husband >= STRONG_NAME {
        return lineage_hit(config, 0.23, Reason::DuplicatedHusbandLineage);
    }
    None
}

// ---------------------------------------------------------------------------
// Weighted-sum fallback
// ---------------------------------------------------------------------------

fn weighted_sum(a: &Record, b: &Record, config: &DedupeConfig) -> ScoreOutcome {
    let breakdown = compute_breakdown(a, b);
    let w = &config.final_score_weights;

    let mut score = w.first_name_score * breakdown.first_name_score
        + w.family_name_score * breakdown.family_name_score
        + w.advanced_name_score * breakdown.advanced_name_score
        + w.token_reorder_score * breakdown.token_reorder_score
        + w.husband_score * breakdown.husband_score
        + w.id_score * breakdown.id_score
        + w.phone_score * breakdown.phone_score
        + w.children_score * breakdown.children_score
        + w.location_score * breakdown.location_score;

    let strong_name_parts = [
        breakdown.first_name_score,
        breakdown.family_name_score,
        breakdown.token_reorder_score,
    ]
    .iter()
    .filter(|&&c| c >= 0.85)
    .count();
    if strong_name_parts >= 2 {
        score += 0.04;
    }
    score = score.clamp(0.0, 1.0);

    let mut reasons = Vec::new();
    if breakdown.token_reorder_score > 0.85 {
        reasons.push(Reason::TokenReorder);
    }

    ScoreOutcome {
        score,
        breakdown,
        reasons,
    }
}

fn compute_breakdown(a: &Record, b: &Record) -> ScoreBreakdown {
    let family_a = join_rest(&a.woman_tokens);
    let family_b = join_rest(&b.woman_tokens);

    ScoreBreakdown {
        first_name_score: jaro_winkler(first(&a.woman_tokens), first(&b.woman_tokens)),
        family_name_score: jaro_winkler(&family_a, &family_b),
        advanced_name_score: jaro_winkler(&root3(&a.woman_tokens), &root3(&b.woman_tokens))
            .min(0.5),
        token_reorder_score: name_order_free_score(&a.woman_tokens, &b.woman_tokens),
        husband_score: jaro_winkler(&a.husband_name_normalized, &b.husband_name_normalized)
            .max(name_order_free_score(&a.husband_tokens, &b.husband_tokens)),
        id_score: id_score(&a.id_digits, &b.id_digits),
        phone_score: phone_score(&a.phone_digits, &b.phone_digits),
        children_score: token_jaccard(&a.children_normalized, &b.children_normalized),
        location_score: location_score(a, b),
    }
}

fn join_rest(tokens: &[String]) -> String {
    if tokens.len() < 2 {
        return String::new();
    }
    tokens[1..].join(" ")
}

/// First three characters of every token, joined: a crude root form that
/// survives suffix variation.
fn root3(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| t.chars().take(3).collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

fn suffix_eq(a: &str, b: &str, n: usize) -> bool {
    a.len() >= n && b.len() >= n && a[a.len() - n..] == b[b.len() - n..]
}

fn id_score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        1.0
    } else if suffix_eq(a, b, 5) {
        0.75
    } else {
        0.0
    }
}

fn phone_score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        1.0
    } else if suffix_eq(a, b, 6) {
        0.85
    } else if suffix_eq(a, b, 4) {
        0.60
    } else {
        0.0
    }
}

fn location_score(a: &Record, b: &Record) -> f64 {
    let mut score: f64 = 0.0;
    if !a.village_normalized.is_empty() && a.village_normalized == b.village_normalized {
        score += 0.40;
    }
    if !a.subdistrict_normalized.is_empty()
        && a.subdistrict_normalized == b.subdistrict_normalized
    {
        score += 0.25;
    }
    score.min(0.50)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
