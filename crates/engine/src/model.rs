use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A record as received from the host, after column mapping but before
/// normalization: canonical fields resolved from the source columns,
/// everything else preserved as passthrough.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    pub woman_name: String,
    pub husband_name: String,
    pub national_id: String,
    pub phone: String,
    pub village: String,
    pub subdistrict: String,
    pub children: ChildrenField,
    pub beneficiary_id: String,
    pub passthrough: BTreeMap<String, serde_json::Value>,
}

/// The children column arrives either as an already-split sequence or as a
/// single delimited string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChildrenField {
    List(Vec<String>),
    Single(String),
}

impl Default for ChildrenField {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// A beneficiary record owned by the engine: canonical fields, derived
/// normalized fields, and the passthrough columns for round-trip output.
///
/// Token and digit caches are working data only; they never cross the wire
/// and are rebuilt from the normalized fields when needed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub internal_id: String,
    pub woman_name: String,
    pub husband_name: String,
    pub national_id: String,
    pub phone: String,
    pub village: String,
    pub subdistrict: String,
    pub children: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub beneficiary_id: String,

    #[serde(rename = "womanName_normalized")]
    pub woman_name_normalized: String,
    #[serde(rename = "husbandName_normalized")]
    pub husband_name_normalized: String,
    #[serde(rename = "village_normalized")]
    pub village_normalized: String,
    #[serde(rename = "subdistrict_normalized")]
    pub subdistrict_normalized: String,
    #[serde(rename = "children_normalized")]
    pub children_normalized: Vec<String>,

    #[serde(skip)]
    pub woman_tokens: Vec<String>,
    #[serde(skip)]
    pub husband_tokens: Vec<String>,
    #[serde(skip)]
    pub id_digits: String,
    #[serde(skip)]
    pub phone_digits: String,

    /// Unmapped source columns, preserved unchanged.
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

/// Why an edge (and transitively a cluster) was formed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    ExactId,
    PolygamyPattern,
    TokenReorder,
    WomanLineageMatch,
    DuplicatedHusbandLineage,
    AdditionalRule,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactId => write!(f, "EXACT_ID"),
            Self::PolygamyPattern => write!(f, "POLYGAMY_PATTERN"),
            Self::TokenReorder => write!(f, "TOKEN_REORDER"),
            Self::WomanLineageMatch => write!(f, "WOMAN_LINEAGE_MATCH"),
            Self::DuplicatedHusbandLineage => write!(f, "DUPLICATED_HUSBAND_LINEAGE"),
            Self::AdditionalRule => write!(f, "ADDITIONAL_RULE"),
        }
    }
}

/// Per-component contributions behind a weighted-sum score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreBreakdown {
    pub first_name_score: f64,
    pub family_name_score: f64,
    pub advanced_name_score: f64,
    pub token_reorder_score: f64,
    pub husband_score: f64,
    pub id_score: f64,
    pub phone_score: f64,
    pub children_score: f64,
    pub location_score: f64,
}

/// A scored candidate pair. `a < b` are indices into the engine's flat
/// record array.
#[derive(Debug, Clone)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    pub score: f64,
    pub reasons: Vec<Reason>,
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

/// A retained intra-cluster pair score, kept for display and averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub a: usize,
    pub b: usize,
    pub score: f64,
}

/// A finalized group of 2–4 records treated as the same beneficiary unit.
/// Holds record indices, never owned copies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    pub records: Vec<usize>,
    pub reasons: BTreeSet<Reason>,
    pub pair_scores: Vec<PairScore>,
}

// ---------------------------------------------------------------------------
// Audit findings
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    DuplicateId,
    WomanMultipleHusbands,
    HighSimilarity,
    DuplicateCouple,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId => write!(f, "DUPLICATE_ID"),
            Self::WomanMultipleHusbands => write!(f, "WOMAN_MULTIPLE_HUSBANDS"),
            Self::HighSimilarity => write!(f, "HIGH_SIMILARITY"),
            Self::DuplicateCouple => write!(f, "DUPLICATE_COUPLE"),
        }
    }
}

/// An audit observation. `records` are indices into the flat record array;
/// findings reference records, they never own them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub severity: Severity,
    pub description: String,
    pub records: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Summary + Result
// ---------------------------------------------------------------------------

/// Run statistics computed from the finished clusters and findings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupeSummary {
    pub total_rows: usize,
    pub clusters: usize,
    pub clustered_rows: usize,
    pub singletons: usize,
    pub edges_scored: usize,
    pub edges_used: usize,
    pub findings_high: usize,
    pub findings_medium: usize,
    pub findings_low: usize,
    pub reason_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMeta {
    pub engine_version: String,
}

/// The engine's terminal output. Deterministic for a given (input, config):
/// no timestamps, map keys in stable order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeResult {
    pub meta: EngineMeta,
    pub summary: DedupeSummary,
    pub rows: Vec<Record>,
    pub clusters: Vec<Cluster>,
    pub findings: Vec<Finding>,
}

// ---------------------------------------------------------------------------
// Cache documents (written by the host; the audit command reads them back)
// ---------------------------------------------------------------------------

/// On-disk cache written by the host: one entry per host-chosen cache id.
pub type CacheFile = BTreeMap<String, CacheDocument>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheDocument {
    pub rows: Vec<Record>,
    pub clusters: Vec<Cluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_findings: Option<Vec<Finding>>,
}
