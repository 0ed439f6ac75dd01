//! Engine ↔ host message surface.
//!
//! The engine runs in a worker task isolated from the UI shell; it receives
//! one input payload and streams back newline-delimited JSON messages. The
//! wire shapes here are the canonical contract for that channel.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::DedupeConfig;
use crate::model::{Cluster, Reason, Record, ScoreBreakdown};

// =============================================================================
// Host → Engine
// =============================================================================

/// The single input payload. `records` is the raw tabular data: one map of
/// column name → value per row. When `mapping` is present, each mapped source
/// column's value replaces the canonical field; all other columns survive as
/// passthrough.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineInput {
    pub records: Vec<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<ColumnMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<DedupeConfig>,
    pub pairwise_only: bool,
}

/// Source-column names for each canonical field. Absent entries fall back to
/// the canonical field name itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMapping {
    pub woman_name: Option<String>,
    pub husband_name: Option<String>,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub village: Option<String>,
    pub subdistrict: Option<String>,
    pub children: Option<String>,
    pub beneficiary_id: Option<String>,
}

// =============================================================================
// Engine → Host
// =============================================================================

/// Messages streamed from the engine to the host, in order: any number of
/// `progress` messages, then exactly one terminal `done` or `error`
/// (`pairwise-result` precedes `done` in pairwise-only mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineMessage {
    Progress(ProgressMessage),
    PairwiseResult(PairwiseResultMessage),
    Done(DoneMessage),
    Error(ErrorMessage),
}

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Blocking,
    BuildingEdges,
    EdgesBuilt,
    MergingEdges,
    Annotating,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::BuildingEdges => write!(f, "building-edges"),
            Self::EdgesBuilt => write!(f, "edges-built"),
            Self::MergingEdges => write!(f, "merging-edges"),
            Self::Annotating => write!(f, "annotating"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// `progress` percentages are monotonically nondecreasing within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub status: Phase,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseResultMessage {
    pub pairs: Vec<PairwiseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairwiseEntry {
    pub a_index: usize,
    pub b_index: usize,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reasons: Vec<Reason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneMessage {
    pub payload: DonePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonePayload {
    pub rows: Vec<Record>,
    pub clusters: Vec<Cluster>,
    pub edges_used: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_wire_shape() {
        let msg = EngineMessage::Progress(ProgressMessage {
            status: Phase::BuildingEdges,
            progress: 42,
            completed: Some(7),
            total: Some(20),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["status"], "building-edges");
        assert_eq!(json["progress"], 42);
        assert_eq!(json["completed"], 7);
    }

    #[test]
    fn progress_omits_absent_counters() {
        let msg = EngineMessage::Progress(ProgressMessage {
            status: Phase::Annotating,
            progress: 90,
            completed: None,
            total: None,
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("completed"));
        assert!(!json.contains("total"));
    }

    #[test]
    fn done_and_error_tags() {
        let done = EngineMessage::Done(DoneMessage {
            payload: DonePayload {
                rows: vec![],
                clusters: vec![],
                edges_used: 3,
            },
        });
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["payload"]["edgesUsed"], 3);

        let err = EngineMessage::Error(ErrorMessage {
            error: "cancelled".into(),
        });
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "cancelled");
    }

    #[test]
    fn pairwise_result_tag_is_kebab_case() {
        let msg = EngineMessage::PairwiseResult(PairwiseResultMessage { pairs: vec![] });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "pairwise-result");
    }

    #[test]
    fn engine_input_accepts_minimal_payload() {
        let input: EngineInput = serde_json::from_str(r#"{"records":[]}"#).unwrap();
        assert!(input.records.is_empty());
        assert!(input.mapping.is_none());
        assert!(input.options.is_none());
        assert!(!input.pairwise_only);
    }
}
