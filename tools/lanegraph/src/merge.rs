//! Intersection merging
//!
//! Nodes closer than a threshold are grouped by connected components over
//! the proximity graph (never greedily pair by pair) and each group collapses
//! into one representative at the group's centroid. Rounds repeat until no
//! two nodes are closer than the threshold, so a second run is a no-op.

use rstar::PointDistance;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::geometry::{self, Point};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::spatial::node_index;
use crate::union_find::UnionFind;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub rounds: usize,
    pub clusters: usize,
    /// Nodes removed by being folded into a representative
    pub merged_nodes: usize,
    /// Edges deleted because both their ends collapsed into one node
    pub removed_loops: usize,
}

/// All unordered node pairs strictly closer than `threshold`, as (smaller, larger)
pub fn close_pairs(graph: &Graph, threshold: f64) -> Vec<(NodeId, NodeId)> {
    let tree = node_index(graph);
    let max_2 = threshold * threshold;

    let mut pairs = Vec::new();
    for p in tree.iter() {
        for q in tree.locate_within_distance(p.coords, max_2) {
            if p.id < q.id && q.distance_2(&p.coords) < max_2 {
                pairs.push((p.id, q.id));
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

/// Connected components of the proximity graph given by `pairs`.
///
/// Each cluster is sorted and clusters are ordered by their smallest id, so
/// the result does not depend on the order of `pairs`.
pub fn clusters_from_pairs(pairs: &[(NodeId, NodeId)]) -> Vec<Vec<NodeId>> {
    let ids: Vec<NodeId> = pairs
        .iter()
        .flat_map(|&(a, b)| [a, b])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: BTreeMap<NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut uf = UnionFind::new(ids.len());
    for (a, b) in pairs {
        uf.union(index[a], index[b]);
    }
    uf.groups()
        .into_iter()
        .filter(|g| g.len() > 1)
        .map(|g| g.into_iter().map(|i| ids[i]).collect())
        .collect()
}

fn centroid(graph: &Graph, members: &[NodeId]) -> Option<Point> {
    geometry::centroid(
        members
            .iter()
            .filter_map(|id| graph.nodes.get(id))
            .map(|n| n.point),
    )
}

/// Collapse one set of clusters into their representatives
fn apply_clusters(graph: &mut Graph, clusters: &[Vec<NodeId>]) -> (usize, usize) {
    let mut representative: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut location: BTreeMap<NodeId, Point> = BTreeMap::new();

    for members in clusters {
        let Some(center) = centroid(graph, members) else {
            continue;
        };
        let rep = members[0];
        location.insert(rep, center);
        for &m in members {
            representative.insert(m, rep);
        }
    }

    // Loops that already existed are kept; only merge-made ones go
    let mut doomed: BTreeSet<EdgeId> = BTreeSet::new();
    for edge in graph.edges.values_mut() {
        let from = representative.get(&edge.from).copied();
        let to = representative.get(&edge.to).copied();
        if let (Some(a), Some(b)) = (from, to) {
            if a == b && edge.from != edge.to {
                doomed.insert(edge.id);
                continue;
            }
        }
        if let Some(rep) = from {
            edge.from = rep;
            edge.waypoints[0] = location[&rep];
        }
        if let Some(rep) = to {
            edge.to = rep;
            if let Some(last) = edge.waypoints.last_mut() {
                *last = location[&rep];
            }
        }
    }

    let mut merged = 0;
    for (&member, &rep) in &representative {
        if member == rep {
            continue;
        }
        if let Some(node) = graph.nodes.remove(&member) {
            merged += 1;
            if let Some(target) = graph.nodes.get_mut(&rep) {
                for (k, v) in node.tags {
                    target.tags.entry(k).or_insert(v);
                }
            }
        }
        graph.lane_links.remove(&member);
    }
    for (rep, point) in &location {
        if let Some(node) = graph.nodes.get_mut(rep) {
            node.point = *point;
            node.incoming.clear();
            node.outgoing.clear();
        }
    }
    for light in graph.lights.iter_mut() {
        if let Some(rep) = representative.get(&light.node) {
            light.node = *rep;
        }
    }

    let removed = doomed.len();
    graph.delete_edges(&doomed);
    (merged, removed)
}

/// Merge every group of nodes chained by distances below `threshold`.
///
/// Must run before edges are linked: node and edge link lists of merged
/// nodes are left for the linker to rebuild.
pub fn merge_close_intersections(graph: &mut Graph, threshold: f64) -> MergeReport {
    let mut report = MergeReport::default();
    loop {
        let pairs = close_pairs(graph, threshold);
        if pairs.is_empty() {
            break;
        }
        let clusters = clusters_from_pairs(&pairs);
        let (merged, removed) = apply_clusters(graph, &clusters);
        debug!(
            round = report.rounds,
            clusters = clusters.len(),
            merged,
            removed_loops = removed,
            "merge round"
        );
        report.rounds += 1;
        report.clusters += clusters.len();
        report.merged_nodes += merged;
        report.removed_loops += removed;
        if merged == 0 {
            break;
        }
    }
    info!(
        threshold,
        clusters = report.clusters,
        merged_nodes = report.merged_nodes,
        removed_loops = report.removed_loops,
        "merged close intersections"
    );
    report
}
