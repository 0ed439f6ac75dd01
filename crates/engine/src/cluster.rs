//! Edge-weighted agglomeration under a hard cluster-size cap.

use std::collections::BTreeSet;

use crate::config::DedupeConfig;
use crate::error::EngineError;
use crate::model::{Cluster, Edge, Reason, Record};
use crate::split::split_subset;

/// Hard cap on cluster membership. Components that would grow past this are
/// fractured rather than resolved into one identity.
pub const MAX_CLUSTER_SIZE: usize = 4;

/// Emit a progress callback every this many consumed edges.
const PROGRESS_EVERY: usize = 200;

// ---------------------------------------------------------------------------
// Union-find
// ---------------------------------------------------------------------------

/// Union-find with path compression, union-by-size, and a per-root member
/// list (the member list doubles as the size for union-by-size).
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl DisjointSet {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            members: (0..size).map(|i| vec![i]).collect(),
        }
    }

    pub(crate) fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cursor = x;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    pub(crate) fn size(&mut self, x: usize) -> usize {
        let root = self.find(x);
        self.members[root].len()
    }

    /// Merge the two components and return the surviving root.
    pub(crate) fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return root_a;
        }
        let (winner, loser) = if self.members[root_a].len() >= self.members[root_b].len() {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };
        self.parent[loser] = winner;
        let moved = std::mem::take(&mut self.members[loser]);
        self.members[winner].extend(moved);
        winner
    }

    pub(crate) fn members_of(&mut self, x: usize) -> &[usize] {
        let root = self.find(x);
        &self.members[root]
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AssembleOutput {
    pub clusters: Vec<Cluster>,
    pub edges_used: usize,
}

/// Consume edges in descending score order, merging while the combined
/// component stays within the cap and splitting on overflow. `edges` must
/// already be sorted (descending score, ties by ascending index pair).
pub fn assemble(
    records: &[Record],
    edges: &[Edge],
    config: &DedupeConfig,
    on_progress: &mut dyn FnMut(usize, usize) -> Result<(), EngineError>,
) -> Result<AssembleOutput, EngineError> {
    let n = records.len();
    let mut dsu = DisjointSet::new(n);
    let mut finalized = vec![false; n];
    let mut root_reasons: Vec<BTreeSet<Reason>> = vec![BTreeSet::new(); n];
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut edges_used = 0usize;

    for (index, edge) in edges.iter().enumerate() {
        if index % PROGRESS_EVERY == 0 {
            on_progress(index, edges.len())?;
        }
        if finalized[edge.a] || finalized[edge.b] {
            continue;
        }

        let root_a = dsu.find(edge.a);
        let root_b = dsu.find(edge.b);
        root_reasons[root_a].extend(edge.reasons.iter().copied());
        root_reasons[root_b].extend(edge.reasons.iter().copied());

        if root_a == root_b {
            edges_used += 1;
            continue;
        }

        if dsu.size(root_a) + dsu.size(root_b) <= MAX_CLUSTER_SIZE {
            let winner = dsu.union(root_a, root_b);
            let loser = if winner == root_a { root_b } else { root_a };
            let moved = std::mem::take(&mut root_reasons[loser]);
            root_reasons[winner].extend(moved);
            edges_used += 1;
            continue;
        }

        // Overflow: resolve both components now, via the splitter.
        let mut subset: Vec<usize> = dsu.members_of(root_a).to_vec();
        subset.extend_from_slice(dsu.members_of(root_b));
        subset.sort_unstable();

        let sub_clusters =
            split_subset(records, &subset, config.thresholds.min_internal, config);
        for cluster in sub_clusters {
            emit(&mut clusters, cluster, &mut finalized)?;
        }
        for &member in &subset {
            finalized[member] = true;
        }
        edges_used += 1;
    }
    on_progress(edges.len(), edges.len())?;

    // Remaining multi-member components, in ascending order of their
    // smallest member. Leftover singletons are dropped: the driver reports
    // them implicitly, by their absence from the cluster list.
    let mut visited_roots: Vec<bool> = vec![false; n];
    for node in 0..n {
        if finalized[node] {
            continue;
        }
        let root = dsu.find(node);
        if visited_roots[root] {
            continue;
        }
        visited_roots[root] = true;

        let mut component: Vec<usize> = dsu
            .members_of(root)
            .iter()
            .copied()
            .filter(|&m| !finalized[m])
            .collect();
        component.sort_unstable();
        if component.len() < 2 {
            continue;
        }

        let sub_clusters =
            split_subset(records, &component, config.thresholds.min_internal, config);
        for mut cluster in sub_clusters {
            cluster.reasons.extend(root_reasons[root].iter().copied());
            emit(&mut clusters, cluster, &mut finalized)?;
        }
        for &member in &component {
            finalized[member] = true;
        }
    }

    tracing::debug!(
        clusters = clusters.len(),
        edges_used,
        "assembly finished"
    );
    Ok(AssembleOutput {
        clusters,
        edges_used,
    })
}

/// Push a finished cluster, enforcing the engine's own invariants.
fn emit(
    clusters: &mut Vec<Cluster>,
    cluster: Cluster,
    finalized: &mut [bool],
) -> Result<(), EngineError> {
    if cluster.records.len() < 2 || cluster.records.len() > MAX_CLUSTER_SIZE {
        return Err(EngineError::Internal(format!(
            "splitter produced a cluster of size {}",
            cluster.records.len()
        )));
    }
    for &member in &cluster.records {
        if finalized[member] {
            return Err(EngineError::Internal(format!(
                "record {member} finalized twice"
            )));
        }
        finalized[member] = true;
    }
    clusters.push(cluster);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChildrenField, RawRecord, Reason};
    use crate::normalize::normalize_record;
    use crate::score::score_pair;

    fn rec(index: usize, woman: &str, id: &str) -> Record {
        let raw = RawRecord {
            woman_name: woman.into(),
            national_id: id.into(),
            children: ChildrenField::default(),
            ..Default::default()
        };
        normalize_record(index, &raw)
    }

    fn score_edges(records: &[Record], config: &DedupeConfig) -> Vec<Edge> {
        let mut edges = Vec::new();
        for a in 0..records.len() {
            for b in a + 1..records.len() {
                let outcome = score_pair(&records[a], &records[b], config);
                if outcome.score >= config.thresholds.min_pair {
                    edges.push(Edge {
                        a,
                        b,
                        score: outcome.score,
                        reasons: outcome.reasons,
                    });
                }
            }
        }
        edges.sort_by(|x, y| {
            y.score
                .total_cmp(&x.score)
                .then_with(|| x.a.cmp(&y.a))
                .then_with(|| x.b.cmp(&y.b))
        });
        edges
    }

    fn run(records: &[Record]) -> AssembleOutput {
        let config = DedupeConfig::default();
        let edges = score_edges(records, &config);
        assemble(records, &edges, &config, &mut |_, _| Ok(())).unwrap()
    }

    #[test]
    fn disjoint_set_union_by_size() {
        let mut dsu = DisjointSet::new(5);
        dsu.union(0, 1);
        dsu.union(2, 3);
        dsu.union(0, 2);
        assert_eq!(dsu.size(3), 4);
        assert_eq!(dsu.find(0), dsu.find(3));
        let mut members = dsu.members_of(1).to_vec();
        members.sort_unstable();
        assert_eq!(members, vec![0, 1, 2, 3]);
        assert_eq!(dsu.size(4), 1);
    }

    #[test]
    fn pair_merges_into_one_cluster() {
        let records = vec![rec(0, "فاطمه علي", "111"), rec(1, "فاطمه علي", "111")];
        let out = run(&records);
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.clusters[0].records, vec![0, 1]);
        assert!(out.clusters[0].reasons.contains(&Reason::ExactId));
        assert_eq!(out.edges_used, 1);
    }

    #[test]
    fn singletons_are_absent_from_output() {
        let records = vec![
            rec(0, "فاطمه علي", "111"),
            rec(1, "فاطمه علي", "111"),
            rec(2, "قاسم وحيد", ""),
        ];
        let out = run(&records);
        assert_eq!(out.clusters.len(), 1);
        let clustered: Vec<usize> = out.clusters.iter().flat_map(|c| c.records.clone()).collect();
        assert!(!clustered.contains(&2));
    }

    #[test]
    fn overflow_fractures_component() {
        // Five mutually-tied records: merging stops at 4, the fifth edge
        // overflows and the whole component is re-split into ≤4 pieces.
        let records: Vec<Record> = (0..5).map(|i| rec(i, "فاطمه علي", "42")).collect();
        let out = run(&records);
        assert!(out.clusters.len() >= 1);
        for cluster in &out.clusters {
            assert!(cluster.records.len() >= 2);
            assert!(cluster.records.len() <= MAX_CLUSTER_SIZE);
        }
        // No record may appear twice.
        let mut all: Vec<usize> = out
            .clusters
            .iter()
            .flat_map(|c| c.records.clone())
            .collect();
        all.sort_unstable();
        all.dedup();
        let clustered = out.clusters.iter().map(|c| c.records.len()).sum::<usize>();
        assert_eq!(all.len(), clustered);
    }

    #[test]
    fn finalized_records_skip_later_edges() {
        // Four tied records fill a cluster; a fifth near-duplicate with a
        // lower-scoring link must not be pulled in afterwards.
        let mut records: Vec<Record> = (0..4).map(|i| rec(i, "فاطمه علي", "77")).collect();
        records.push(rec(4, "فاطمه علي محمد الجبوري", ""));
        let config = DedupeConfig::default();
        let edges = score_edges(&records, &config);
        let out = assemble(&records, &edges, &config, &mut |_, _| Ok(())).unwrap();
        for cluster in &out.clusters {
            assert!(cluster.records.len() <= MAX_CLUSTER_SIZE);
        }
    }

    #[test]
    fn progress_and_cancellation() {
        let records = vec![rec(0, "فاطمه علي", "111"), rec(1, "فاطمه علي", "111")];
        let config = DedupeConfig::default();
        let edges = score_edges(&records, &config);
        let err = assemble(&records, &edges, &config, &mut |_, _| {
            Err(EngineError::Cancelled)
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn deterministic_cluster_order() {
        let records = vec![
            rec(0, "زينب كريم", "9"),
            rec(1, "زينب كريم", "9"),
            rec(2, "فاطمه علي", "5"),
            rec(3, "فاطمه علي", "5"),
        ];
        let first = run(&records);
        let second = run(&records);
        let shape = |out: &AssembleOutput| -> Vec<Vec<usize>> {
            out.clusters.iter().map(|c| c.records.clone()).collect()
        };
        assert_eq!(shape(&first), shape(&second));
    }
}
