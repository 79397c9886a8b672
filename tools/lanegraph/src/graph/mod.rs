//! Arena-style road graph
//!
//! Nodes, edges, lanes and lane-link segments live in owned maps keyed by
//! stable ids; every cross reference is an id lookup. A [`SublayeredGraph`]
//! is a primary graph plus an optional, fully independent secondary graph.

mod ids;
pub mod topology;

pub use ids::{ClusterId, EdgeId, IdCounter, LaneId, NodeId, SegmentId};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::annotate::{AppliedLight, AppliedSign};
use crate::error::{ConvertError, Result};
use crate::geometry::{self, Point, PointExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub point: Point,
    /// Id of the source node this was built from (the smallest one after a merge)
    pub source_id: Option<i64>,
    pub tags: BTreeMap<String, String>,
    /// Edge traversals arriving at this node
    pub incoming: Vec<EdgeLink>,
    /// Edge traversals leaving this node
    pub outgoing: Vec<EdgeLink>,
}

impl Node {
    pub fn new(id: NodeId, point: Point) -> Self {
        Self {
            id,
            point,
            source_id: None,
            tags: BTreeMap::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }
}

/// One edge traversed in one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeLink {
    pub edge: EdgeId,
    /// `true` = from → to
    pub forward: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeLinks {
    pub successors: Vec<EdgeLink>,
    pub predecessors: Vec<EdgeLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub source_way: Option<i64>,
    pub road_class: String,
    pub lane_count: u16,
    /// Lanes travelling from → to; the remaining lanes travel to → from
    pub forward_lanes: u16,
    pub oneway: bool,
    pub lane_width: f64,
    /// Centerline, always starting at `from` and ending at `to`
    pub waypoints: Vec<Point>,
    /// Working polyline per lane index, in edge direction
    pub lane_paths: Vec<Vec<Point>>,
    /// Centerline length left after cropping
    pub trimmed_length: Option<f64>,
    /// Links of the from → to traversal
    pub forward_links: EdgeLinks,
    /// Links of the to → from traversal
    pub backward_links: EdgeLinks,
}

impl Edge {
    pub fn new(id: EdgeId, from: NodeId, to: NodeId, waypoints: Vec<Point>) -> Self {
        Self {
            id,
            from,
            to,
            source_way: None,
            road_class: String::new(),
            lane_count: 1,
            forward_lanes: 1,
            oneway: true,
            lane_width: 3.5,
            waypoints,
            lane_paths: Vec::new(),
            trimmed_length: None,
            forward_links: EdgeLinks::default(),
            backward_links: EdgeLinks::default(),
        }
    }

    pub fn backward_lanes(&self) -> u16 {
        self.lane_count.saturating_sub(self.forward_lanes)
    }

    /// Lanes 0..backward_lanes travel against the edge direction
    pub fn lane_is_forward(&self, index: u16) -> bool {
        index >= self.backward_lanes()
    }

    pub fn is_loop(&self) -> bool {
        self.from == self.to
    }

    pub fn length(&self) -> f64 {
        geometry::polyline_length(&self.waypoints)
    }

    pub fn other_end(&self, node: NodeId) -> NodeId {
        if self.from == node {
            self.to
        } else {
            self.from
        }
    }

    /// Node a lane starts from in its travel direction
    pub fn lane_start_node(&self, index: u16) -> NodeId {
        if self.lane_is_forward(index) {
            self.from
        } else {
            self.to
        }
    }

    pub fn lane_end_node(&self, index: u16) -> NodeId {
        if self.lane_is_forward(index) {
            self.to
        } else {
            self.from
        }
    }

    /// Lane indices travelling in `forward` direction, ordered left to right
    /// as seen by a driver on them.
    pub fn lanes_left_to_right(&self, forward: bool) -> Vec<u16> {
        let backward = self.backward_lanes();
        if forward {
            (backward..self.lane_count).collect()
        } else {
            (0..backward).rev().collect()
        }
    }

    pub fn can_traverse(&self, forward: bool) -> bool {
        if forward {
            self.forward_lanes > 0
        } else {
            self.backward_lanes() > 0
        }
    }

    pub fn links(&self, forward: bool) -> &EdgeLinks {
        if forward {
            &self.forward_links
        } else {
            &self.backward_links
        }
    }

    pub fn lane_ids(&self) -> impl Iterator<Item = LaneId> + '_ {
        (0..self.lane_count).map(move |i| LaneId::new(self.id, i))
    }
}

/// A lane with its final geometry, oriented in travel direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    pub forward: bool,
    pub width: f64,
    pub centerline: Vec<Point>,
    pub left_bound: Vec<Point>,
    pub right_bound: Vec<Point>,
    pub predecessors: Vec<LaneId>,
    pub successors: Vec<LaneId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TurnDirection {
    Straight,
    Left,
    Right,
    UTurn,
}

impl fmt::Display for TurnDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnDirection::Straight => "straight",
            TurnDirection::Left => "left",
            TurnDirection::Right => "right",
            TurnDirection::UTurn => "u-turn",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Lanes meet directly at a plain (degree 2) node
    Continuation,
    /// Transition through an intersection, realised by a lane-link segment
    Turn(TurnDirection),
}

/// A lane transition at a node: (node, from lane, to lane)
pub type Transition = (NodeId, LaneId, LaneId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LaneConnection {
    pub node: NodeId,
    pub from: LaneId,
    pub to: LaneId,
    pub kind: ConnectionKind,
}

/// Canonical lane references at one node. Each physical lane appears at most
/// once per list regardless of how many edges reach it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeLaneLinks {
    pub incoming: Vec<LaneId>,
    pub outgoing: Vec<LaneId>,
    pub connections: Vec<LaneConnection>,
}

/// Connector geometry between an incoming and an outgoing lane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneLinkSegment {
    pub id: SegmentId,
    pub node: NodeId,
    pub from: LaneId,
    pub to: LaneId,
    pub turn: TurnDirection,
    pub width: f64,
    pub centerline: Vec<Point>,
    pub left_bound: Vec<Point>,
    pub right_bound: Vec<Point>,
    pub cluster: Option<ClusterId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: BTreeMap<NodeId, Node>,
    pub edges: BTreeMap<EdgeId, Edge>,
    pub lane_links: BTreeMap<NodeId, NodeLaneLinks>,
    pub lanes: BTreeMap<LaneId, Lane>,
    pub segments: BTreeMap<SegmentId, LaneLinkSegment>,
    pub signs: Vec<AppliedSign>,
    pub lights: Vec<AppliedLight>,
    ids: IdCounter,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids_mut(&mut self) -> &mut IdCounter {
        &mut self.ids
    }

    pub fn add_node(&mut self, point: Point) -> NodeId {
        let id = self.ids.node();
        self.nodes.insert(id, Node::new(id, point));
        id
    }

    /// Insert a fully built node, keeping its id
    pub fn insert_node(&mut self, node: Node) {
        self.ids.observe_node(node.id);
        self.nodes.insert(node.id, node);
    }

    /// Add an edge between existing nodes. Empty `waypoints` means a straight
    /// segment; otherwise the first and last waypoints are pinned to the nodes.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, waypoints: Vec<Point>) -> Result<EdgeId> {
        let id = self.ids.edge();
        let edge = Edge::new(id, from, to, waypoints);
        self.insert_edge(edge)?;
        Ok(id)
    }

    pub fn insert_edge(&mut self, mut edge: Edge) -> Result<()> {
        let from = self.node_point(edge.id, edge.from)?;
        let to = self.node_point(edge.id, edge.to)?;
        if edge.waypoints.len() < 2 {
            edge.waypoints = vec![from, to];
        } else {
            edge.waypoints[0] = from;
            if let Some(last) = edge.waypoints.last_mut() {
                *last = to;
            }
        }
        self.ids.observe_edge(edge.id);
        self.edges.insert(edge.id, edge);
        Ok(())
    }

    fn node_point(&self, edge: EdgeId, node: NodeId) -> Result<Point> {
        self.nodes
            .get(&node)
            .map(|n| n.point)
            .ok_or(ConvertError::UnknownNode { edge, node })
    }

    /// Incident edges per node; a loop edge is listed twice at its node
    pub fn adjacency(&self) -> BTreeMap<NodeId, Vec<EdgeId>> {
        let mut adj: BTreeMap<NodeId, Vec<EdgeId>> =
            self.nodes.keys().map(|&id| (id, Vec::new())).collect();
        for edge in self.edges.values() {
            adj.entry(edge.from).or_default().push(edge.id);
            adj.entry(edge.to).or_default().push(edge.id);
        }
        adj
    }

    pub fn incident_edges(&self, node: NodeId) -> Vec<EdgeId> {
        let mut out = Vec::new();
        for edge in self.edges.values() {
            if edge.from == node {
                out.push(edge.id);
            }
            if edge.to == node {
                out.push(edge.id);
            }
        }
        out
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.incident_edges(node).len()
    }

    pub fn is_intersection(&self, node: NodeId) -> bool {
        self.degree(node) >= 3
    }

    /// Remove edges together with everything derived from them: lanes,
    /// lane links, segments, signs, and nodes left without any edge.
    pub fn delete_edges(&mut self, ids: &BTreeSet<EdgeId>) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.edges.remove(id);
        }

        for edge in self.edges.values_mut() {
            for links in [&mut edge.forward_links, &mut edge.backward_links] {
                links.successors.retain(|l| !ids.contains(&l.edge));
                links.predecessors.retain(|l| !ids.contains(&l.edge));
            }
        }
        for node in self.nodes.values_mut() {
            node.incoming.retain(|l| !ids.contains(&l.edge));
            node.outgoing.retain(|l| !ids.contains(&l.edge));
        }
        self.signs.retain(|s| !ids.contains(&s.edge));

        let doomed: BTreeSet<LaneId> = self
            .lanes
            .keys()
            .filter(|l| ids.contains(&l.edge))
            .copied()
            .collect();
        self.purge_lane_refs(|lane| ids.contains(&lane.edge));
        for lane in doomed {
            self.lanes.remove(&lane);
        }

        self.remove_orphan_nodes();
    }

    /// Remove lanes and every reference to them
    pub fn delete_lanes(&mut self, ids: &BTreeSet<LaneId>) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.lanes.remove(id);
        }
        self.purge_lane_refs(|lane| ids.contains(&lane));
    }

    /// Remove lane-link segments and the turns they realised
    pub fn delete_segments(&mut self, ids: &BTreeSet<SegmentId>) {
        let turns: BTreeSet<Transition> = ids
            .iter()
            .filter_map(|id| self.segments.remove(id))
            .map(|s| (s.node, s.from, s.to))
            .collect();
        self.drop_turns(&turns);
    }

    /// Forget turn transitions that have no connector: the node's turn
    /// connection goes, and so does the lane successor/predecessor pair
    /// unless another connection still carries it.
    pub fn drop_turns(&mut self, turns: &BTreeSet<Transition>) {
        if turns.is_empty() {
            return;
        }
        for links in self.lane_links.values_mut() {
            links.connections.retain(|c| {
                !(matches!(c.kind, ConnectionKind::Turn(_)) && turns.contains(&(c.node, c.from, c.to)))
            });
        }
        let carried: BTreeSet<(LaneId, LaneId)> = self
            .lane_links
            .values()
            .flat_map(|links| links.connections.iter().map(|c| (c.from, c.to)))
            .collect();
        let gone: BTreeSet<(LaneId, LaneId)> = turns
            .iter()
            .map(|&(_, from, to)| (from, to))
            .filter(|pair| !carried.contains(pair))
            .collect();
        for lane in self.lanes.values_mut() {
            let id = lane.id;
            lane.successors.retain(|&to| !gone.contains(&(id, to)));
            lane.predecessors.retain(|&from| !gone.contains(&(from, id)));
        }
    }

    fn purge_lane_refs(&mut self, dead: impl Fn(LaneId) -> bool) {
        for links in self.lane_links.values_mut() {
            links.incoming.retain(|&l| !dead(l));
            links.outgoing.retain(|&l| !dead(l));
            links.connections.retain(|c| !dead(c.from) && !dead(c.to));
        }
        for lane in self.lanes.values_mut() {
            lane.predecessors.retain(|&l| !dead(l));
            lane.successors.retain(|&l| !dead(l));
        }
        self.segments.retain(|_, s| !dead(s.from) && !dead(s.to));
    }

    fn remove_orphan_nodes(&mut self) {
        let used: BTreeSet<NodeId> = self
            .edges
            .values()
            .flat_map(|e| [e.from, e.to])
            .collect();
        self.nodes.retain(|id, _| used.contains(id));
        self.lane_links.retain(|id, _| used.contains(id));
        self.lights.retain(|l| used.contains(&l.node));
    }

    /// Keep only the undirected connected component containing the node
    /// closest to the centroid of all nodes. Returns the number of removed
    /// edges.
    pub fn make_contiguous(&mut self) -> usize {
        let Some(reference) = self.reference_node() else {
            return 0;
        };

        let adj = self.adjacency();
        let mut seen = BTreeSet::from([reference]);
        let mut queue = VecDeque::from([reference]);
        while let Some(node) = queue.pop_front() {
            for edge_id in adj.get(&node).into_iter().flatten() {
                if let Some(edge) = self.edges.get(edge_id) {
                    let next = edge.other_end(node);
                    if seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }

        let doomed: BTreeSet<EdgeId> = self
            .edges
            .values()
            .filter(|e| !seen.contains(&e.from))
            .map(|e| e.id)
            .collect();
        let removed = doomed.len();
        self.delete_edges(&doomed);
        self.nodes.retain(|id, _| seen.contains(id));
        removed
    }

    fn reference_node(&self) -> Option<NodeId> {
        let centroid = geometry::centroid(self.nodes.values().map(|n| n.point))?;
        self.nodes
            .values()
            .min_by(|a, b| {
                a.point
                    .distance(centroid)
                    .total_cmp(&b.point.distance(centroid))
                    .then(a.id.cmp(&b.id))
            })
            .map(|node| node.id)
    }

    /// Structural check: every edge endpoint must name a present node
    pub fn verify_references(&self) -> Result<()> {
        for edge in self.edges.values() {
            for node in [edge.from, edge.to] {
                if !self.nodes.contains_key(&node) {
                    return Err(ConvertError::UnknownNode { edge: edge.id, node });
                }
            }
        }
        Ok(())
    }

    /// Number of distinct clusters among lane-link segments
    pub fn cluster_count(&self) -> usize {
        self.segments
            .values()
            .filter_map(|s| s.cluster)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer {
    Primary,
    Sublayer,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Primary => f.write_str("primary"),
            Layer::Sublayer => f.write_str("sublayer"),
        }
    }
}

/// Primary graph plus an optional co-located secondary network.
/// The two graphs share no ids and are never merged into each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SublayeredGraph {
    pub graph: Graph,
    pub sublayer: Option<Graph>,
}

impl SublayeredGraph {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            sublayer: None,
        }
    }

    pub fn with_sublayer(graph: Graph, sublayer: Graph) -> Self {
        Self {
            graph,
            sublayer: Some(sublayer),
        }
    }

    /// Apply `f` to the primary graph and then, if present, to the sublayer
    pub fn for_each_layer<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Layer, &mut Graph) -> Result<()>,
    {
        f(Layer::Primary, &mut self.graph)?;
        if let Some(sublayer) = self.sublayer.as_mut() {
            f(Layer::Sublayer, sublayer)?;
        }
        Ok(())
    }

    pub fn layers(&self) -> impl Iterator<Item = (Layer, &Graph)> {
        std::iter::once((Layer::Primary, &self.graph))
            .chain(self.sublayer.iter().map(|g| (Layer::Sublayer, g)))
    }
}
