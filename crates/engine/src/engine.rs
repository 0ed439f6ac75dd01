//! Driver: runs the pipeline phases and streams progress messages.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::audit::run_audit;
use crate::block::candidate_pairs;
use crate::cluster::assemble;
use crate::config::DedupeConfig;
use crate::error::EngineError;
use crate::messages::{
    ColumnMapping, DoneMessage, DonePayload, EngineInput, EngineMessage, ErrorMessage,
    PairwiseEntry, PairwiseResultMessage, Phase, ProgressMessage,
};
use crate::model::{
    ChildrenField, Cluster, DedupeResult, DedupeSummary, Edge, EngineMeta, Finding, RawRecord,
    Record,
};
use crate::normalize::normalize_record;
use crate::score::score_pair;

/// Emit a building-edges progress message every this many scored candidates.
const SCORE_PROGRESS_EVERY: usize = 500;

/// Run the engine over one input payload. Progress and terminal messages are
/// pushed through `sink` in order; `cancel` is honored at every
/// progress-emit boundary. On success the sink sees a final `done` message;
/// on any failure it sees a single `error` message and no `done`.
pub fn run(
    input: &EngineInput,
    sink: &mut dyn FnMut(EngineMessage),
    cancel: &AtomicBool,
) -> Result<DedupeResult, EngineError> {
    match run_inner(input, sink, cancel) {
        Ok(result) => {
            sink(EngineMessage::Done(DoneMessage {
                payload: DonePayload {
                    rows: result.rows.clone(),
                    clusters: result.clusters.clone(),
                    edges_used: result.summary.edges_used,
                },
            }));
            Ok(result)
        }
        Err(err) => {
            sink(EngineMessage::Error(ErrorMessage {
                error: err.to_string(),
            }));
            Err(err)
        }
    }
}

fn run_inner(
    input: &EngineInput,
    sink: &mut dyn FnMut(EngineMessage),
    cancel: &AtomicBool,
) -> Result<DedupeResult, EngineError> {
    let config = input.options.clone().unwrap_or_default();
    config.validate()?;

    let records = resolve_records(input);
    tracing::info!(rows = records.len(), pairwise = input.pairwise_only, "engine run started");

    let mut reporter = Reporter { sink, cancel };

    if input.pairwise_only {
        return run_pairwise(&records, &config, &mut reporter);
    }

    // Blocking.
    reporter.emit(Phase::Blocking, 0, None, None)?;
    let candidates = candidate_pairs(
        &records,
        config.thresholds.block_chunk_size,
        &mut |completed, total| {
            let pct = scaled(completed, total, 0, 20);
            reporter.emit(Phase::Blocking, pct, Some(completed), Some(total))
        },
    )?;

    // Edge build.
    let mut edges: Vec<Edge> = Vec::new();
    for (index, &(a, b)) in candidates.iter().enumerate() {
        if index % SCORE_PROGRESS_EVERY == 0 {
            let pct = scaled(index, candidates.len(), 20, 60);
            reporter.emit(Phase::BuildingEdges, pct, Some(index), Some(candidates.len()))?;
        }
        let outcome = score_pair(&records[a], &records[b], &config);
        if outcome.score >= config.thresholds.min_pair {
            edges.push(Edge {
                a,
                b,
                score: outcome.score,
                reasons: outcome.reasons,
            });
        }
    }
    edges.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| x.a.cmp(&y.a))
            .then_with(|| x.b.cmp(&y.b))
    });
    reporter.emit(Phase::EdgesBuilt, 60, Some(edges.len()), Some(candidates.len()))?;

    // Edge consumption.
    let assembled = assemble(&records, &edges, &config, &mut |completed, total| {
        let pct = scaled(completed, total, 60, 90);
        reporter.emit(Phase::MergingEdges, pct, Some(completed), Some(total))
    })?;

    // Audit + summary.
    reporter.emit(Phase::Annotating, 90, None, None)?;
    let findings = run_audit(&records, &assembled.clusters);
    let summary = compute_summary(
        &records,
        &assembled.clusters,
        &findings,
        edges.len(),
        assembled.edges_used,
    );
    reporter.emit(Phase::Done, 100, None, None)?;

    Ok(DedupeResult {
        meta: meta(),
        summary,
        rows: records,
        clusters: assembled.clusters,
        findings,
    })
}

fn run_pairwise(
    records: &[Record],
    config: &DedupeConfig,
    reporter: &mut Reporter<'_>,
) -> Result<DedupeResult, EngineError> {
    let n = records.len();
    let total = n * n.saturating_sub(1) / 2;
    let mut pairs = Vec::with_capacity(total);

    for a in 0..n {
        for b in a + 1..n {
            if pairs.len() % SCORE_PROGRESS_EVERY == 0 {
                let pct = scaled(pairs.len(), total, 0, 99);
                reporter.emit(Phase::BuildingEdges, pct, Some(pairs.len()), Some(total))?;
            }
            let outcome = score_pair(&records[a], &records[b], config);
            pairs.push(PairwiseEntry {
                a_index: a,
                b_index: b,
                score: outcome.score,
                breakdown: outcome.breakdown,
                reasons: outcome.reasons,
            });
        }
    }

    let edges_scored = pairs.len();
    (reporter.sink)(EngineMessage::PairwiseResult(PairwiseResultMessage { pairs }));
    reporter.emit(Phase::Done, 100, None, None)?;

    let summary = compute_summary(records, &[], &[], edges_scored, 0);
    Ok(DedupeResult {
        meta: meta(),
        summary,
        rows: records.to_vec(),
        clusters: Vec::new(),
        findings: Vec::new(),
    })
}

fn meta() -> EngineMeta {
    EngineMeta {
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

struct Reporter<'a> {
    sink: &'a mut dyn FnMut(EngineMessage),
    cancel: &'a AtomicBool,
}

impl Reporter<'_> {
    fn emit(
        &mut self,
        status: Phase,
        progress: u8,
        completed: Option<usize>,
        total: Option<usize>,
    ) -> Result<(), EngineError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        (self.sink)(EngineMessage::Progress(ProgressMessage {
            status,
            progress,
            completed,
            total,
        }));
        Ok(())
    }
}

fn scaled(completed: usize, total: usize, lo: u8, hi: u8) -> u8 {
    let span = (hi - lo) as usize;
    lo + (span * completed / total.max(1)).min(span) as u8
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Resolve raw host rows into normalized records. The column mapping is
/// applied exactly here; a missing mapped column resolves to an empty field,
/// never an error.
pub fn resolve_records(input: &EngineInput) -> Vec<Record> {
    let mapping = input.mapping.clone().unwrap_or_default();
    input
        .records
        .iter()
        .enumerate()
        .map(|(index, row)| normalize_record(index, &resolve_raw(row, &mapping)))
        .collect()
}

fn resolve_raw(row: &BTreeMap<String, serde_json::Value>, mapping: &ColumnMapping) -> RawRecord {
    let woman_col = column(&mapping.woman_name, "womanName");
    let husband_col = column(&mapping.husband_name, "husbandName");
    let id_col = column(&mapping.national_id, "nationalId");
    let phone_col = column(&mapping.phone, "phone");
    let village_col = column(&mapping.village, "village");
    let subdistrict_col = column(&mapping.subdistrict, "subdistrict");
    let children_col = column(&mapping.children, "children");
    let beneficiary_col = column(&mapping.beneficiary_id, "beneficiaryId");

    let consumed: BTreeSet<&str> = [
        woman_col,
        husband_col,
        id_col,
        phone_col,
        village_col,
        subdistrict_col,
        children_col,
        beneficiary_col,
    ]
    .into();

    let passthrough = row
        .iter()
        .filter(|(key, _)| !consumed.contains(key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    RawRecord {
        woman_name: text_field(row, woman_col),
        husband_name: text_field(row, husband_col),
        national_id: text_field(row, id_col),
        phone: text_field(row, phone_col),
        village: text_field(row, village_col),
        subdistrict: text_field(row, subdistrict_col),
        children: children_field(row, children_col),
        beneficiary_id: text_field(row, beneficiary_col),
        passthrough,
    }
}

fn column<'a>(mapped: &'a Option<String>, canonical: &'a str) -> &'a str {
    mapped.as_deref().unwrap_or(canonical)
}

fn text_field(row: &BTreeMap<String, serde_json::Value>, column: &str) -> String {
    row.get(column).map(value_to_string).unwrap_or_default()
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn children_field(row: &BTreeMap<String, serde_json::Value>, column: &str) -> ChildrenField {
    match row.get(column) {
        Some(serde_json::Value::Array(items)) => {
            ChildrenField::List(items.iter().map(value_to_string).collect())
        }
        Some(value) => ChildrenField::Single(value_to_string(value)),
        None => ChildrenField::default(),
    }
}

// ---------------------------------------------------------------------------
// CSV adapter
// ---------------------------------------------------------------------------

/// Decode header-ful CSV from an in-memory string into raw host rows. Every
/// cell is kept as a string; rows shorter than the header are padded with
/// empties by omission.
pub fn load_csv_records(
    csv_data: &str,
) -> Result<Vec<BTreeMap<String, serde_json::Value>>, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EngineError::CsvParse(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| EngineError::CsvParse(e.to_string()))?;
        let mut row = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            if let Some(value) = record.get(i) {
                row.insert(header.clone(), serde_json::Value::String(value.to_string()));
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Compute run statistics from the finished clusters and findings.
pub fn compute_summary(
    records: &[Record],
    clusters: &[Cluster],
    findings: &[Finding],
    edges_scored: usize,
    edges_used: usize,
) -> DedupeSummary {
    let clustered_rows: usize = clusters.iter().map(|c| c.records.len()).sum();

    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    for cluster in clusters {
        for reason in &cluster.reasons {
            *reason_counts.entry(reason.to_string()).or_insert(0) += 1;
        }
    }

    let mut summary = DedupeSummary {
        total_rows: records.len(),
        clusters: clusters.len(),
        clustered_rows,
        singletons: records.len() - clustered_rows,
        edges_scored,
        edges_used,
        reason_counts,
        ..Default::default()
    };
    for finding in findings {
        match finding.severity {
            crate::model::Severity::High => summary.findings_high += 1,
            crate::model::Severity::Medium => summary.findings_medium += 1,
            crate::model::Severity::Low => summary.findings_low += 1,
        }
    }
    summary
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
