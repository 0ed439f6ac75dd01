// Property-based invariants for the dedup engine.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use proptest::prelude::*;

use takrar_engine::config::DedupeConfig;
use takrar_engine::engine::run;
use takrar_engine::messages::EngineInput;
use takrar_engine::model::{ChildrenField, RawRecord};
use takrar_engine::normalize::{normalize, normalize_record};
use takrar_engine::score::score_pair;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn config_64() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Arbitrary text mixing Arabic letters, diacritics, ASCII and punctuation.
fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => r"[\u{0621}-\u{064A}\u{064B}-\u{0652} ]{0,24}",
        2 => r"[A-Za-z0-9 .,\-']{0,24}",
        1 => any::<String>(),
    ]
}

/// Woman/husband names drawn from a small token pool so collisions and
/// near-misses actually happen.
fn arb_name() -> impl Strategy<Value = String> {
    let token = prop_oneof![
        Just("فاطمه".to_string()),
        Just("فاطمة".to_string()),
        Just("زينب".to_string()),
        Just("علي".to_string()),
        Just("محمد".to_string()),
        Just("محمود".to_string()),
        Just("الجبوري".to_string()),
        Just("كريم".to_string()),
        Just("حسن".to_string()),
    ];
    proptest::collection::vec(token, 0..5).prop_map(|tokens| tokens.join(" "))
}

fn arb_id() -> impl Strategy<Value = String> {
    prop_oneof![
        2 => Just(String::new()),
        2 => r"[0-9]{5}",
        1 => Just("77777".to_string()),
    ]
}

fn arb_raw_record() -> impl Strategy<Value = RawRecord> {
    (arb_name(), arb_name(), arb_id(), r"[0-9]{0,10}").prop_map(
        |(woman_name, husband_name, national_id, phone)| RawRecord {
            woman_name,
            husband_name,
            national_id,
            phone,
            children: ChildrenField::default(),
            ..Default::default()
        },
    )
}

fn arb_input() -> impl Strategy<Value = EngineInput> {
    proptest::collection::vec((arb_name(), arb_name(), arb_id()), 0..12).prop_map(|rows| {
        EngineInput {
            records: rows
                .into_iter()
                .map(|(woman, husband, id)| {
                    let mut row: BTreeMap<String, serde_json::Value> = BTreeMap::new();
                    row.insert("womanName".into(), woman.into());
                    row.insert("husbandName".into(), husband.into());
                    row.insert("nationalId".into(), id.into());
                    row
                })
                .collect(),
            ..Default::default()
        }
    })
}

fn run_silent(input: &EngineInput) -> takrar_engine::model::DedupeResult {
    let cancel = AtomicBool::new(false);
    run(input, &mut |_| {}, &cancel).unwrap()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn normalizer_is_idempotent(s in arb_text()) {
        let once = normalize(&s);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn normalized_text_is_lowercase_and_collapsed(s in arb_text()) {
        let out = normalize(&s);
        prop_assert!(!out.contains("  "));
        prop_assert!(!out.starts_with(' '));
        prop_assert!(!out.ends_with(' '));
        prop_assert_eq!(out.to_lowercase(), out.clone());
    }

    #[test]
    fn scorer_is_symmetric(a in arb_raw_record(), b in arb_raw_record()) {
        let config = DedupeConfig::default();
        let ra = normalize_record(0, &a);
        let rb = normalize_record(1, &b);
        let ab = score_pair(&ra, &rb, &config);
        let ba = score_pair(&rb, &ra, &config);
        prop_assert_eq!(ab.score, ba.score);
        prop_assert_eq!(ab.breakdown, ba.breakdown);
        prop_assert_eq!(ab.reasons, ba.reasons);
    }

    #[test]
    fn scores_stay_in_unit_interval(a in arb_raw_record(), b in arb_raw_record()) {
        let config = DedupeConfig::default();
        let ra = normalize_record(0, &a);
        let rb = normalize_record(1, &b);
        let out = score_pair(&ra, &rb, &config);
        prop_assert!((0.0..=1.0).contains(&out.score));
    }
}

proptest! {
    #![proptest_config(config_64())]

    #[test]
    fn clusters_are_bounded_and_disjoint(input in arb_input()) {
        let result = run_silent(&input);

        let mut seen = vec![false; result.rows.len()];
        for cluster in &result.clusters {
            prop_assert!(cluster.records.len() >= 2);
            prop_assert!(cluster.records.len() <= 4);
            for &member in &cluster.records {
                prop_assert!(member < result.rows.len());
                prop_assert!(!seen[member], "record {} in two clusters", member);
                seen[member] = true;
            }
        }

        let clustered = seen.iter().filter(|&&s| s).count();
        prop_assert_eq!(result.summary.clustered_rows, clustered);
        prop_assert_eq!(result.summary.singletons, result.rows.len() - clustered);
    }

    #[test]
    fn reruns_are_bitwise_identical(input in arb_input()) {
        let first = serde_json::to_string(&run_silent(&input)).unwrap();
        let second = serde_json::to_string(&run_silent(&input)).unwrap();
        prop_assert_eq!(first, second);
    }
}
