//! Network invariant validation
//!
//! Fast-fail checks on a finished (or partially built) graph:
//! - Edge endpoints reference present nodes, waypoints pinned to them
//! - Lanes, segments, lane links and annotations reference present entities
//! - Left and right bounds have equal point counts
//! - Boundary consistency: linked endpoints coincide
//! - Every lane successor is realised by a continuation or a segment

use std::collections::BTreeSet;

use crate::graph::{ConnectionKind, Graph, LaneId};
use crate::validate::repair::max_endpoint_gap;

/// Largest tolerated gap between endpoints that must coincide (m)
pub const BOUNDARY_EPSILON: f64 = 1e-9;

/// At most this many messages are kept per failed check
const MAX_MESSAGES: usize = 5;

/// Invariant check results
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InvariantReport {
    pub passed: bool,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl InvariantReport {
    fn new() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    /// Record one check from its list of violations
    fn check(&mut self, name: &str, violations: Vec<String>) {
        self.checks_run += 1;
        if violations.is_empty() {
            self.checks_passed += 1;
            return;
        }
        self.passed = false;
        let total = violations.len();
        for v in violations.into_iter().take(MAX_MESSAGES) {
            self.errors.push(format!("{name}: {v}"));
        }
        if total > MAX_MESSAGES {
            self.errors
                .push(format!("{name}: ... and {} more", total - MAX_MESSAGES));
        }
    }
}

/// Run every check. `boundary` enables the checks that only hold on a
/// finished network: endpoint consistency and connector coverage of every
/// lane transition.
pub fn check_invariants(graph: &Graph, boundary: bool) -> InvariantReport {
    let mut result = InvariantReport::new();

    let mut missing = Vec::new();
    let mut unpinned = Vec::new();
    for edge in graph.edges.values() {
        for node in [edge.from, edge.to] {
            if !graph.nodes.contains_key(&node) {
                missing.push(format!("edge {} references node {}", edge.id, node));
            }
        }
        let (Some(from), Some(to)) = (graph.nodes.get(&edge.from), graph.nodes.get(&edge.to)) else {
            continue;
        };
        if edge.waypoints.first() != Some(&from.point) || edge.waypoints.last() != Some(&to.point) {
            unpinned.push(format!("edge {} waypoints do not end at its nodes", edge.id));
        }
    }
    result.check("edge endpoints", missing);
    result.check("edge waypoints", unpinned);

    let mut lane_refs = Vec::new();
    for lane in graph.lanes.values() {
        match graph.edges.get(&lane.id.edge) {
            Some(edge) if lane.id.index < edge.lane_count => {}
            _ => lane_refs.push(format!("lane {} has no owning edge lane", lane.id)),
        }
        for other in lane.predecessors.iter().chain(&lane.successors) {
            if !graph.lanes.contains_key(other) {
                lane_refs.push(format!("lane {} links to missing lane {}", lane.id, other));
            }
        }
    }
    result.check("lane references", lane_refs);

    let mut segment_refs = Vec::new();
    for segment in graph.segments.values() {
        for lane in [segment.from, segment.to] {
            if !graph.lanes.contains_key(&lane) {
                segment_refs.push(format!("segment {} references missing lane {}", segment.id, lane));
            }
        }
        if !graph.nodes.contains_key(&segment.node) {
            segment_refs.push(format!("segment {} sits at missing node {}", segment.id, segment.node));
        }
    }
    result.check("segment references", segment_refs);

    let mut link_refs = Vec::new();
    if !graph.lanes.is_empty() {
        for (node, links) in &graph.lane_links {
            let lanes = links
                .incoming
                .iter()
                .chain(&links.outgoing)
                .chain(links.connections.iter().flat_map(|c| [&c.from, &c.to]));
            for lane in lanes {
                if !graph.lanes.contains_key(lane) {
                    link_refs.push(format!("node {node} lane links name missing lane {lane}"));
                }
            }
        }
    }
    result.check("lane-link references", link_refs);

    let mut annotation_refs = Vec::new();
    for sign in &graph.signs {
        if !graph.edges.contains_key(&sign.edge) {
            annotation_refs.push(format!("sign {} bound to missing edge {}", sign.sign.id, sign.edge));
        }
    }
    for light in &graph.lights {
        if !graph.nodes.contains_key(&light.node) {
            annotation_refs.push(format!("light {} bound to missing node {}", light.light.id, light.node));
        }
    }
    result.check("annotation references", annotation_refs);

    let mut counts = Vec::new();
    let mut unbounded = 0;
    for lane in graph.lanes.values() {
        if lane.left_bound.len() != lane.right_bound.len() {
            counts.push(format!(
                "lane {} bounds have {} and {} points",
                lane.id,
                lane.left_bound.len(),
                lane.right_bound.len()
            ));
        }
        if lane.left_bound.is_empty() {
            unbounded += 1;
        }
    }
    for segment in graph.segments.values() {
        if segment.left_bound.len() != segment.right_bound.len() {
            counts.push(format!(
                "segment {} bounds have {} and {} points",
                segment.id,
                segment.left_bound.len(),
                segment.right_bound.len()
            ));
        }
    }
    result.check("bound point counts", counts);
    if unbounded > 0 {
        result.warn(format!("{unbounded} lanes have no bounds yet"));
    }

    if boundary {
        let gap = max_endpoint_gap(graph);
        let violations = if gap > BOUNDARY_EPSILON {
            vec![format!("linked endpoints up to {gap:.3e} m apart")]
        } else {
            Vec::new()
        };
        result.check("boundary consistency", violations);
        result.check("lane transitions", unrealised_transitions(graph));
    }

    result
}

/// Successor/predecessor pairs with neither a continuation nor a segment
fn unrealised_transitions(graph: &Graph) -> Vec<String> {
    let realised: BTreeSet<(LaneId, LaneId)> = graph
        .lane_links
        .values()
        .flat_map(|links| &links.connections)
        .filter(|c| c.kind == ConnectionKind::Continuation)
        .map(|c| (c.from, c.to))
        .chain(graph.segments.values().map(|s| (s.from, s.to)))
        .collect();

    let mut violations = Vec::new();
    for lane in graph.lanes.values() {
        for to in &lane.successors {
            if !realised.contains(&(lane.id, *to)) {
                violations.push(format!("lane {} continues into {} without connector", lane.id, to));
            }
        }
        for from in &lane.predecessors {
            if !realised.contains(&(*from, lane.id)) {
                violations.push(format!("lane {} is entered from {} without connector", lane.id, from));
            }
        }
    }
    violations
}
