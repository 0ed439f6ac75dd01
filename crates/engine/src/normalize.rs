//! Text normalization for Arabic and mixed-script beneficiary fields.

use unicode_normalization::UnicodeNormalization;

use crate::model::{ChildrenField, RawRecord, Record};

/// Arabic combining marks stripped during normalization: tanween/harakat,
/// Quranic annotation signs, and the small high/low marks.
fn is_arabic_diacritic(c: char) -> bool {
    matches!(c,
        '\u{064B}'..='\u{065F}' | '\u{0610}'..='\u{061A}' | '\u{06D6}'..='\u{06ED}')
}

/// Fold common Arabic letter variants onto a canonical letter: alef with
/// madda/hamza → bare alef, waw/ya with hamza → bare waw/ya, teh marbuta → heh.
fn fold_arabic_letter(c: char) -> char {
    match c {
        '\u{0622}' | '\u{0623}' | '\u{0625}' => '\u{0627}',
        '\u{0624}' => '\u{0648}',
        '\u{0626}' => '\u{064A}',
        '\u{0629}' => '\u{0647}',
        _ => c,
    }
}

fn is_kept(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c) || c.is_ascii_alphanumeric()
}

/// Canonicalize a string for matching: NFKC fold, strip Arabic diacritics,
/// fold Arabic letter variants, replace everything outside
/// {Arabic block, ASCII letters, digits, whitespace} with a space, collapse
/// whitespace, trim, lowercase. Idempotent.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.nfkc() {
        if is_arabic_diacritic(ch) {
            continue;
        }
        let ch = fold_arabic_letter(ch);
        if is_kept(ch) {
            for lc in ch.to_lowercase() {
                out.push(lc);
            }
        } else if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    out
}

pub fn tokens(s: &str) -> Vec<String> {
    normalize(s)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

pub fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Split a raw children field into individual child names. A sequence passes
/// through as-is; a single string is split on any of `; , | ،`.
pub fn split_children(field: &ChildrenField) -> Vec<String> {
    match field {
        ChildrenField::List(items) => items
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        ChildrenField::Single(s) => s
            .split([';', ',', '|', '،'])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
    }
}

/// Normalized child names, in input order, empty entries dropped.
pub fn normalize_children(field: &ChildrenField) -> Vec<String> {
    split_children(field)
        .iter()
        .map(|child| normalize(child))
        .filter(|child| !child.is_empty())
        .collect()
}

/// Attach normalized fields and working caches to a raw record. Records are
/// immutable after this step.
pub fn normalize_record(index: usize, raw: &RawRecord) -> Record {
    let woman_name_normalized = normalize(&raw.woman_name);
    let husband_name_normalized = normalize(&raw.husband_name);
    let woman_tokens = woman_name_normalized
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let husband_tokens = husband_name_normalized
        .split_whitespace()
        .map(str::to_string)
        .collect();

    Record {
        internal_id: format!("row_{index}"),
        woman_name: raw.woman_name.clone(),
        husband_name: raw.husband_name.clone(),
        national_id: raw.national_id.clone(),
        phone: raw.phone.clone(),
        village: raw.village.clone(),
        subdistrict: raw.subdistrict.clone(),
        children: split_children(&raw.children),
        beneficiary_id: raw.beneficiary_id.clone(),
        woman_name_normalized,
        husband_name_normalized,
        village_normalized: normalize(&raw.village),
        subdistrict_normalized: normalize(&raw.subdistrict),
        children_normalized: normalize_children(&raw.children),
        woman_tokens,
        husband_tokens,
        id_digits: digits_only(&raw.national_id),
        phone_digits: digits_only(&raw.phone),
        passthrough: raw.passthrough.clone(),
    }
}
