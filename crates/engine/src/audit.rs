//! Rule-based audit over finished clusters.
//!
//! Pure function of (records, clusters): every rule scans the clustered
//! records and produces zero or more findings referencing them by index.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Cluster, Finding, FindingKind, Record, Severity};
use crate::similarity::jaro_winkler;

const WOMAN_SIMILARITY_FLOOR: f64 = 0.92;
const HUSBAND_SIMILARITY_FLOOR: f64 = 0.90;

pub fn run_audit(records: &[Record], clusters: &[Cluster]) -> Vec<Finding> {
    let clustered: Vec<usize> = clusters
        .iter()
        .flat_map(|c| c.records.iter().copied())
        .filter(|&i| i < records.len())
        .collect();

    let mut findings = Vec::new();
    findings.extend(duplicate_ids(records, &clustered));
    findings.extend(women_with_multiple_husbands(records, &clustered));
    findings.extend(high_similarity_pairs(records, clusters));
    findings.extend(duplicate_couples(records, &clustered));
    findings
}

/// One finding per national id carried by two or more clustered records.
fn duplicate_ids(records: &[Record], clustered: &[usize]) -> Vec<Finding> {
    let mut by_id: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for &index in clustered {
        let id = records[index].national_id.trim();
        if !id.is_empty() {
            by_id.entry(id).or_default().push(index);
        }
    }

    by_id
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(id, members)| Finding {
            kind: FindingKind::DuplicateId,
            severity: Severity::High,
            description: format!("{} records share national id {id}", members.len()),
            records: members,
        })
        .collect()
}

/// A woman name registered under two or more distinct husbands.
fn women_with_multiple_husbands(records: &[Record], clustered: &[usize]) -> Vec<Finding> {
    let mut by_woman: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &index in clustered {
        let record = &records[index];
        let name = record.woman_name.trim();
        let key = if name.is_empty() {
            record.internal_id.clone()
        } else {
            name.to_string()
        };
        by_woman.entry(key).or_default().push(index);
    }

    let mut findings = Vec::new();
    for (woman, members) in by_woman {
        if members.len() < 2 {
            continue;
        }
        let husbands: BTreeSet<&str> = members
            .iter()
            .map(|&i| records[i].husband_name.trim())
            .filter(|h| !h.is_empty())
            .collect();
        if husbands.len() >= 2 {
            findings.push(Finding {
                kind: FindingKind::WomanMultipleHusbands,
                severity: Severity::High,
                description: format!(
                    "\"{woman}\" appears with {} different husband names",
                    husbands.len()
                ),
                records: members,
            });
        }
    }
    findings
}

/// Intra-cluster pairs whose woman and husband names are both near-identical.
fn high_similarity_pairs(records: &[Record], clusters: &[Cluster]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for cluster in clusters {
        for (i, &a) in cluster.records.iter().enumerate() {
            for &b in &cluster.records[i + 1..] {
                let woman = jaro_winkler(
                    &records[a].woman_name_normalized,
                    &records[b].woman_name_normalized,
                );
                let husband = jaro_winkler(
                    &records[a].husband_name_normalized,
                    &records[b].husband_name_normalized,
                );
                if woman >= WOMAN_SIMILARITY_FLOOR && husband >= HUSBAND_SIMILARITY_FLOOR {
                    findings.push(Finding {
                        kind: FindingKind::HighSimilarity,
                        severity: Severity::Medium,
                        description: format!(
                            "{} and {} agree on both names (woman {woman:.2}, husband {husband:.2})",
                            records[a].internal_id, records[b].internal_id
                        ),
                        records: vec![a, b],
                    });
                }
            }
        }
    }
    findings
}

/// The same (woman, husband) couple registered more than once.
fn duplicate_couples(records: &[Record], clustered: &[usize]) -> Vec<Finding> {
    let mut by_couple: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &index in clustered {
        let record = &records[index];
        if record.woman_name.trim().is_empty() && record.husband_name.trim().is_empty() {
            continue;
        }
        let key = format!(
            "{}|{}",
            record.woman_name.to_lowercase(),
            record.husband_name.to_lowercase()
        );
        by_couple.entry(key).or_default().push(index);
    }

    by_couple
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|members| {
            let first = &records[members[0]];
            Finding {
                kind: FindingKind::DuplicateCouple,
                severity: Severity::Medium,
                description: format!(
                    "{} registrations of the couple \"{}\" / \"{}\"",
                    members.len(),
                    first.woman_name.trim(),
                    first.husband_name.trim()
                ),
                records: members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChildrenField, RawRecord};
    use crate::normalize::normalize_record;

    fn rec(index: usize, woman: &str, husband: &str, id: &str) -> Record {
        let raw = RawRecord {
            woman_name: woman.into(),
            husband_name: husband.into(),
            national_id: id.into(),
            children: ChildrenField::default(),
            ..Default::default()
        };
        normalize_record(index, &raw)
    }

    fn cluster(members: &[usize]) -> Cluster {
        Cluster {
            records: members.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_clusters_produce_no_findings() {
        assert!(run_audit(&[], &[]).is_empty());
    }

    #[test]
    fn duplicate_id_spans_clusters() {
        // Three records with id 77 spread across two clusters: exactly one
        // finding listing all three.
        let records = vec![
            rec(0, "فاطمه", "كريم", "77"),
            rec(1, "فاطمه علي", "كريم", "77"),
            rec(2, "زينب", "حسن", "77"),
            rec(3, "زينب قاسم", "حسن", "88"),
        ];
        let clusters = vec![cluster(&[0, 1]), cluster(&[2, 3])];
        let findings: Vec<_> = run_audit(&records, &clusters)
            .into_iter()
            .filter(|f| f.kind == FindingKind::DuplicateId)
            .collect();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].records, vec![0, 1, 2]);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn woman_with_two_husbands_is_flagged() {
        let records = vec![
            rec(0, "فاطمة علي الجبوري", "كريم جاسم", "1"),
            rec(1, "فاطمة علي الجبوري", "عبدالله ناصر", "2"),
        ];
        let clusters = vec![cluster(&[0, 1])];
        let findings: Vec<_> = run_audit(&records, &clusters)
            .into_iter()
            .filter(|f| f.kind == FindingKind::WomanMultipleHusbands)
            .collect();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].records, vec![0, 1]);
    }

    #[test]
    fn same_husband_everywhere_is_not_flagged() {
        let records = vec![
            rec(0, "فاطمة علي", "كريم جاسم", "1"),
            rec(1, "فاطمة علي", "كريم جاسم", "2"),
        ];
        let clusters = vec![cluster(&[0, 1])];
        assert!(run_audit(&records, &clusters)
            .iter()
            .all(|f| f.kind != FindingKind::WomanMultipleHusbands));
    }

    #[test]
    fn high_similarity_fires_per_pair() {
        let records = vec![
            rec(0, "فاطمه علي الجبوري", "كريم جاسم محمد", "1"),
            rec(1, "فاطمه علي الجبوري", "كريم جاسم محمد", "2"),
            rec(2, "بشرى كاظم", "سعد وليد", "3"),
        ];
        let clusters = vec![cluster(&[0, 1, 2])];
        let findings: Vec<_> = run_audit(&records, &clusters)
            .into_iter()
            .filter(|f| f.kind == FindingKind::HighSimilarity)
            .collect();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].records, vec![0, 1]);
    }

    #[test]
    fn unclustered_records_are_ignored() {
        // Record 2 shares an id but sits outside every cluster.
        let records = vec![
            rec(0, "فاطمه", "كريم", "55"),
            rec(1, "فاطمه", "كريم", "55"),
            rec(2, "زينب", "حسن", "55"),
        ];
        let clusters = vec![cluster(&[0, 1])];
        let findings = run_audit(&records, &clusters);
        let dup = findings
            .iter()
            .find(|f| f.kind == FindingKind::DuplicateId)
            .unwrap();
        assert_eq!(dup.records, vec![0, 1]);
    }

    #[test]
    fn duplicate_couple_uses_plain_lowercase_key() {
        let records = vec![
            rec(0, "Fatima ALI", "Karim Jasim", "1"),
            rec(1, "fatima ali", "karim jasim", "2"),
        ];
        let clusters = vec![cluster(&[0, 1])];
        let findings: Vec<_> = run_audit(&records, &clusters)
            .into_iter()
            .filter(|f| f.kind == FindingKind::DuplicateCouple)
            .collect();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].records, vec![0, 1]);
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn rule_order_is_stable() {
        let records = vec![
            rec(0, "فاطمه علي", "كريم جاسم", "9"),
            rec(1, "فاطمه علي", "كريم جاسم", "9"),
        ];
        let clusters = vec![cluster(&[0, 1])];
        let kinds: Vec<FindingKind> = run_audit(&records, &clusters)
            .iter()
            .map(|f| f.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                FindingKind::DuplicateId,
                FindingKind::HighSimilarity,
                FindingKind::DuplicateCouple
            ]
        );
    }
}
