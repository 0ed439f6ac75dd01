//! Blocking index: partition records into candidate buckets so only
//! intra-bucket pairs reach the scorer.

use std::collections::{BTreeMap, HashSet};

use crate::error::EngineError;
use crate::model::Record;

/// Sentinel bucket for records that produce no blocking key at all.
const FALLBACK_BUCKET: &str = "blk:all";

/// Emit a progress callback every this many buckets.
const PROGRESS_EVERY: usize = 20;

fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn suffix_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

/// Blocking keys for one record. A key is produced only when every component
/// it names is non-empty; a record with no keys lands in the sentinel bucket.
pub fn blocking_keys(record: &Record) -> Vec<String> {
    let w_first = prefix_chars(
        record.woman_tokens.first().map(String::as_str).unwrap_or(""),
        3,
    );
    let h_first = prefix_chars(
        record.husband_tokens.first().map(String::as_str).unwrap_or(""),
        3,
    );
    let id_last4 = suffix_chars(&record.id_digits, 4);
    let phone_last4 = suffix_chars(&record.phone_digits, 4);
    let village = prefix_chars(&record.village_normalized, 6);

    let mut keys = Vec::new();
    if !w_first.is_empty() && !h_first.is_empty() && !id_last4.is_empty() && !phone_last4.is_empty()
    {
        keys.push(format!("full:{w_first}:{h_first}:{id_last4}:{phone_last4}"));
    }
    if !w_first.is_empty() && !phone_last4.is_empty() {
        keys.push(format!("wp:{w_first}:{phone_last4}"));
    }
    if !w_first.is_empty() && !id_last4.is_empty() {
        keys.push(format!("wi:{w_first}:{id_last4}"));
    }
    if !w_first.is_empty() && !h_first.is_empty() {
        keys.push(format!("wh:{w_first}:{h_first}"));
    }
    if !h_first.is_empty() {
        keys.push(format!("h:{h_first}"));
    }
    if !w_first.is_empty() {
        keys.push(format!("w:{w_first}"));
    }
    if !village.is_empty() {
        keys.push(format!("v:{village}"));
    }
    if keys.is_empty() {
        keys.push(FALLBACK_BUCKET.to_string());
    }
    keys
}

/// All candidate index pairs, deduplicated, in deterministic order (buckets
/// visited by sorted key, members by ascending record index).
///
/// Buckets larger than `chunk_size` are processed in contiguous chunks of
/// that size, each chunk paired with itself only: bounded worst-case cost
/// at the price of some recall in pathological buckets. `on_progress` is
/// invoked every 20 buckets with `(completed, total)` and may abort the walk
/// by returning an error.
pub fn candidate_pairs(
    records: &[Record],
    chunk_size: usize,
    on_progress: &mut dyn FnMut(usize, usize) -> Result<(), EngineError>,
) -> Result<Vec<(usize, usize)>, EngineError> {
    let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        for key in blocking_keys(record) {
            buckets.entry(key).or_default().push(index);
        }
    }

    let total = buckets.len();
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    let mut seen: HashSet<(usize, usize)> = HashSet::new();

    for (completed, members) in buckets.values().enumerate() {
        if completed % PROGRESS_EVERY == 0 {
            on_progress(completed, total)?;
        }
        for chunk in members.chunks(chunk_size) {
            for (i, &a) in chunk.iter().enumerate() {
                for &b in &chunk[i + 1..] {
                    if seen.insert((a, b)) {
                        pairs.push((a, b));
                    }
                }
            }
        }
    }
    on_progress(total, total)?;

    tracing::debug!(
        buckets = total,
        candidates = pairs.len(),
        "blocking index built"
    );
    Ok(pairs)
}
