//! Edge and lane linking
//!
//! Edge level: every node learns which edge traversals arrive and leave,
//! and every traversal learns its successors at its end node and its
//! predecessors at its start node. U-turns back onto the same edge are not
//! successors, so a dead end has an empty successor set.
//!
//! Lane level: per node, one canonical [`NodeLaneLinks`] holding the
//! incoming and outgoing lanes and the lane-to-lane connections through it.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::{ConvertError, Result};
use crate::geometry::{point_along, signed_angle, Point, PointExt};
use crate::graph::{
    ConnectionKind, Edge, EdgeId, EdgeLink, Graph, LaneConnection, LaneId, NodeId,
    NodeLaneLinks, TurnDirection,
};

/// How far into an edge its heading at a node is measured (m)
const HEADING_LOOKAHEAD: f64 = 5.0;

/// Turns within this angle of dead ahead count as straight (degrees)
const STRAIGHT_TOLERANCE_DEG: f64 = 35.0;

/// Turns sharper than this are U-turns and get no connection (degrees)
const U_TURN_DEG: f64 = 150.0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeLinkReport {
    pub traversals: usize,
    /// Traversals that end at a node with nowhere else to go
    pub dead_ends: usize,
}

pub fn link_edges(graph: &mut Graph) -> Result<EdgeLinkReport> {
    for node in graph.nodes.values_mut() {
        node.incoming.clear();
        node.outgoing.clear();
    }

    for edge in graph.edges.values() {
        for node in [edge.from, edge.to] {
            if !graph.nodes.contains_key(&node) {
                return Err(ConvertError::UnknownNode { edge: edge.id, node });
            }
        }
    }

    let edges: Vec<(EdgeId, NodeId, NodeId, bool, bool)> = graph
        .edges
        .values()
        .map(|e| (e.id, e.from, e.to, e.can_traverse(true), e.can_traverse(false)))
        .collect();
    for (id, from, to, fwd, bwd) in edges {
        if fwd {
            push_link(graph, from, to, EdgeLink { edge: id, forward: true });
        }
        if bwd {
            push_link(graph, to, from, EdgeLink { edge: id, forward: false });
        }
    }

    let mut report = EdgeLinkReport::default();
    let nodes = &graph.nodes;
    for edge in graph.edges.values_mut() {
        for forward in [true, false] {
            let (start, end) = if forward {
                (edge.from, edge.to)
            } else {
                (edge.to, edge.from)
            };
            let traversable = edge.can_traverse(forward);
            let edge_id = edge.id;
            let links = if forward {
                &mut edge.forward_links
            } else {
                &mut edge.backward_links
            };
            links.successors.clear();
            links.predecessors.clear();
            if !traversable {
                continue;
            }
            report.traversals += 1;

            if let Some(node) = nodes.get(&end) {
                links.successors = node
                    .outgoing
                    .iter()
                    .filter(|l| l.edge != edge_id)
                    .copied()
                    .collect();
            }
            if let Some(node) = nodes.get(&start) {
                links.predecessors = node
                    .incoming
                    .iter()
                    .filter(|l| l.edge != edge_id)
                    .copied()
                    .collect();
            }
            if links.successors.is_empty() {
                report.dead_ends += 1;
            }
        }
    }

    info!(
        traversals = report.traversals,
        dead_ends = report.dead_ends,
        "linked edges"
    );
    Ok(report)
}

fn push_link(graph: &mut Graph, start: NodeId, end: NodeId, link: EdgeLink) {
    if let Some(node) = graph.nodes.get_mut(&start) {
        node.outgoing.push(link);
    }
    if let Some(node) = graph.nodes.get_mut(&end) {
        node.incoming.push(link);
    }
}

/// One end of an edge as seen from a node
#[derive(Debug, Clone, PartialEq)]
struct Arm {
    edge: EdgeId,
    at_end: bool,
    /// Lanes arriving at the node, left to right for their drivers
    incoming: Vec<LaneId>,
    /// Lanes leaving the node, left to right for their drivers
    outgoing: Vec<LaneId>,
    /// Unit direction from the node into the edge
    heading: Option<Point>,
}

fn arm(edge: &Edge, at_end: bool) -> Arm {
    let lanes = |forward: bool| -> Vec<LaneId> {
        edge.lanes_left_to_right(forward)
            .into_iter()
            .map(|i| LaneId::new(edge.id, i))
            .collect()
    };
    let path: Vec<Point> = if at_end {
        edge.waypoints.iter().rev().copied().collect()
    } else {
        edge.waypoints.clone()
    };
    let heading = path
        .first()
        .and_then(|&origin| (point_along(&path, HEADING_LOOKAHEAD) - origin).normalize());
    Arm {
        edge: edge.id,
        at_end,
        incoming: lanes(at_end),
        outgoing: lanes(!at_end),
        heading,
    }
}

/// Classify the turn from an arriving arm into a leaving arm
fn classify(from: &Arm, to: &Arm) -> Option<TurnDirection> {
    let arriving = -from.heading?;
    let leaving = to.heading?;
    let angle = signed_angle(arriving, leaving).to_degrees();
    if angle.abs() >= U_TURN_DEG {
        Some(TurnDirection::UTurn)
    } else if angle.abs() <= STRAIGHT_TOLERANCE_DEG {
        Some(TurnDirection::Straight)
    } else if angle > 0.0 {
        Some(TurnDirection::Left)
    } else {
        Some(TurnDirection::Right)
    }
}

/// Lane pairs for one arm-to-arm movement: lanes keep to the right for
/// straight movements, left turns leave from the leftmost lane, right turns
/// from the rightmost.
fn lane_pairs(incoming: &[LaneId], outgoing: &[LaneId], kind: ConnectionKind) -> Vec<(LaneId, LaneId)> {
    match kind {
        ConnectionKind::Continuation | ConnectionKind::Turn(TurnDirection::Straight) => incoming
            .iter()
            .rev()
            .zip(outgoing.iter().rev())
            .map(|(a, b)| (*a, *b))
            .collect(),
        ConnectionKind::Turn(TurnDirection::Left) => {
            incoming.first().zip(outgoing.first()).map(|(a, b)| (*a, *b)).into_iter().collect()
        }
        ConnectionKind::Turn(TurnDirection::Right) => {
            incoming.last().zip(outgoing.last()).map(|(a, b)| (*a, *b)).into_iter().collect()
        }
        ConnectionKind::Turn(TurnDirection::UTurn) => Vec::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneLinkReport {
    pub nodes: usize,
    pub continuations: usize,
    pub turns: usize,
}

pub fn link_lanes(graph: &mut Graph) -> LaneLinkReport {
    let adjacency = graph.adjacency();
    let mut report = LaneLinkReport::default();
    let mut all_links: BTreeMap<NodeId, NodeLaneLinks> = BTreeMap::new();

    for (&node, incident) in &adjacency {
        let mut arms: Vec<Arm> = Vec::with_capacity(incident.len());
        let mut seen_loops = BTreeSet::new();
        for edge_id in incident {
            let Some(edge) = graph.edges.get(edge_id) else {
                continue;
            };
            if edge.is_loop() {
                if seen_loops.insert(edge.id) {
                    arms.push(arm(edge, false));
                    arms.push(arm(edge, true));
                }
                continue;
            }
            arms.push(arm(edge, edge.to == node));
        }

        let mut incoming = BTreeSet::new();
        let mut outgoing = BTreeSet::new();
        let mut connections = BTreeSet::new();
        for a in &arms {
            incoming.extend(a.incoming.iter().copied());
            outgoing.extend(a.outgoing.iter().copied());
        }

        for from in &arms {
            for to in &arms {
                if from.edge == to.edge && from.at_end == to.at_end {
                    continue;
                }
                if from.incoming.is_empty() || to.outgoing.is_empty() {
                    continue;
                }
                let kind = if arms.len() == 2 {
                    ConnectionKind::Continuation
                } else {
                    match classify(from, to) {
                        Some(TurnDirection::UTurn) => continue,
                        Some(turn) => ConnectionKind::Turn(turn),
                        None => {
                            debug!(%node, from = %from.edge, to = %to.edge, "no heading, skipping movement");
                            continue;
                        }
                    }
                };
                for (a, b) in lane_pairs(&from.incoming, &to.outgoing, kind) {
                    connections.insert(LaneConnection {
                        node,
                        from: a,
                        to: b,
                        kind,
                    });
                }
            }
        }

        for c in &connections {
            match c.kind {
                ConnectionKind::Continuation => report.continuations += 1,
                ConnectionKind::Turn(_) => report.turns += 1,
            }
        }
        report.nodes += 1;
        all_links.insert(
            node,
            NodeLaneLinks {
                incoming: incoming.into_iter().collect(),
                outgoing: outgoing.into_iter().collect(),
                connections: connections.into_iter().collect(),
            },
        );
    }

    graph.lane_links = all_links;
    info!(
        nodes = report.nodes,
        continuations = report.continuations,
        turns = report.turns,
        "linked lanes"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Star of two-way roads around a centre node, one per heading (degrees)
    fn star(headings: &[f64]) -> (Graph, NodeId, Vec<EdgeId>) {
        let mut g = Graph::new();
        let centre = g.add_node(Point::new(0.0, 0.0));
        let mut edges = Vec::new();
        for h in headings {
            let r = h.to_radians();
            let end = g.add_node(Point::new(50.0 * r.cos(), 50.0 * r.sin()));
            let id = g.add_edge(centre, end, Vec::new()).unwrap();
            let edge = g.edges.get_mut(&id).unwrap();
            edge.oneway = false;
            edge.lane_count = 2;
            edge.forward_lanes = 1;
            edges.push(id);
        }
        (g, centre, edges)
    }

    #[test]
    fn test_dead_end_has_no_successors() {
        let (mut g, centre, edges) = star(&[0.0]);
        let report = link_edges(&mut g).unwrap();
        assert_eq!(report.traversals, 2);
        assert_eq!(report.dead_ends, 2);
        assert!(g.edges[&edges[0]].forward_links.successors.is_empty());
        assert_eq!(g.nodes[&centre].outgoing.len(), 1);
    }

    #[test]
    fn test_t_junction_successors() {
        let (mut g, centre, edges) = star(&[0.0, 90.0, 180.0]);
        link_edges(&mut g).unwrap();
        // Arriving at the centre on edge 0 (backward traversal)
        let succ = &g.edges[&edges[0]].backward_links.successors;
        assert_eq!(succ.len(), 2);
        assert!(succ.iter().all(|l| l.forward && l.edge != edges[0]));
        assert_eq!(g.nodes[&centre].incoming.len(), 3);
    }

    #[test]
    fn test_four_way_turn_classes() {
        let (mut g, centre, edges) = star(&[0.0, 90.0, 180.0, 270.0]);
        link_edges(&mut g).unwrap();
        let report = link_lanes(&mut g);
        assert_eq!(report.turns, 12);

        let links = &g.lane_links[&centre];
        assert_eq!(links.incoming.len(), 4);
        assert_eq!(links.outgoing.len(), 4);

        // From the east arm (heading 0) travelling west: north is a right turn
        let from_east = LaneId::new(edges[0], 0);
        let to_north = LaneId::new(edges[1], 1);
        let c = links
            .connections
            .iter()
            .find(|c| c.from == from_east && c.to == to_north)
            .unwrap();
        assert_eq!(c.kind, ConnectionKind::Turn(TurnDirection::Right));
    }

    #[test]
    fn test_plain_node_continuation_right_aligned() {
        let mut g = Graph::new();
        let a = g.add_node(Point::new(0.0, 0.0));
        let b = g.add_node(Point::new(20.0, 0.0));
        let c = g.add_node(Point::new(40.0, 0.0));
        let e1 = g.add_edge(a, b, Vec::new()).unwrap();
        let e2 = g.add_edge(b, c, Vec::new()).unwrap();
        g.edges.get_mut(&e1).unwrap().lane_count = 3;
        g.edges.get_mut(&e1).unwrap().forward_lanes = 3;
        g.edges.get_mut(&e2).unwrap().lane_count = 2;
        g.edges.get_mut(&e2).unwrap().forward_lanes = 2;

        link_lanes(&mut g);
        let conns = &g.lane_links[&b].connections;
        assert_eq!(conns.len(), 2);
        assert!(conns.iter().all(|c| c.kind == ConnectionKind::Continuation));
        assert!(conns.iter().any(|c| c.from == LaneId::new(e1, 2) && c.to == LaneId::new(e2, 1)));
        assert!(conns.iter().any(|c| c.from == LaneId::new(e1, 1) && c.to == LaneId::new(e2, 0)));
    }

    #[test]
    fn test_loop_does_not_fail() {
        let mut g = Graph::new();
        let a = g.add_node(Point::new(0.0, 0.0));
        let b = g.add_node(Point::new(-30.0, 0.0));
        g.add_edge(b, a, Vec::new()).unwrap();
        let lp = g
            .add_edge(a, a, vec![Point::new(0.0, 0.0), Point::new(20.0, 10.0), Point::new(20.0, -10.0), Point::new(0.0, 0.0)])
            .unwrap();
        link_edges(&mut g).unwrap();
        assert!(g.edges[&lp].forward_links.successors.iter().all(|l| l.edge != lp));
        link_lanes(&mut g);
        assert!(g.lane_links.contains_key(&a));
    }
}
