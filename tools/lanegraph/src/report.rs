//! Summary statistics and the JSON view of a finished network

use serde::Serialize;
use std::fmt;
use std::io::Write;

use crate::annotate::{AppliedLight, AppliedSign};
use crate::error::Result;
use crate::geometry::Point;
use crate::graph::{ClusterId, EdgeId, Graph, Layer, LaneId, NodeId, SegmentId, SublayeredGraph, TurnDirection};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub nodes: usize,
    pub edges: usize,
    pub lanes: usize,
    pub segments: usize,
    pub clusters: usize,
    pub signs: usize,
    pub lights: usize,
}

impl NetworkStats {
    pub fn of(graph: &Graph) -> Self {
        Self {
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
            lanes: graph.lanes.len(),
            segments: graph.segments.len(),
            clusters: graph.cluster_count(),
            signs: graph.signs.len(),
            lights: graph.lights.len(),
        }
    }
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} edges, {} lanes, {} segments in {} clusters, {} signs, {} lights",
            self.nodes, self.edges, self.lanes, self.segments, self.clusters, self.signs, self.lights
        )
    }
}

#[derive(Debug, Serialize)]
pub struct LaneView<'a> {
    pub id: String,
    pub edge: EdgeId,
    pub index: u16,
    pub forward: bool,
    pub width: f64,
    pub centerline: &'a [Point],
    pub left_bound: &'a [Point],
    pub right_bound: &'a [Point],
    pub predecessors: Vec<String>,
    pub successors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SegmentView<'a> {
    pub id: SegmentId,
    pub node: NodeId,
    pub from: String,
    pub to: String,
    pub turn: TurnDirection,
    pub cluster: Option<ClusterId>,
    pub width: f64,
    pub centerline: &'a [Point],
    pub left_bound: &'a [Point],
    pub right_bound: &'a [Point],
}

#[derive(Debug, Serialize)]
pub struct LayerView<'a> {
    pub layer: Layer,
    pub stats: NetworkStats,
    pub lanes: Vec<LaneView<'a>>,
    pub segments: Vec<SegmentView<'a>>,
    pub signs: &'a [AppliedSign],
    pub lights: &'a [AppliedLight],
}

/// Flat (list-based) rendering of the lane network for external exporters.
/// Lane ids are written in their `e<edge>/<index>` form.
#[derive(Debug, Serialize)]
pub struct LaneNetworkView<'a> {
    pub layers: Vec<LayerView<'a>>,
}

fn ids(lanes: &[LaneId]) -> Vec<String> {
    lanes.iter().map(ToString::to_string).collect()
}

impl<'a> LayerView<'a> {
    pub fn new(layer: Layer, graph: &'a Graph) -> Self {
        let lanes = graph
            .lanes
            .values()
            .map(|lane| LaneView {
                id: lane.id.to_string(),
                edge: lane.id.edge,
                index: lane.id.index,
                forward: lane.forward,
                width: lane.width,
                centerline: &lane.centerline,
                left_bound: &lane.left_bound,
                right_bound: &lane.right_bound,
                predecessors: ids(&lane.predecessors),
                successors: ids(&lane.successors),
            })
            .collect();
        let segments = graph
            .segments
            .values()
            .map(|s| SegmentView {
                id: s.id,
                node: s.node,
                from: s.from.to_string(),
                to: s.to.to_string(),
                turn: s.turn,
                cluster: s.cluster,
                width: s.width,
                centerline: &s.centerline,
                left_bound: &s.left_bound,
                right_bound: &s.right_bound,
            })
            .collect();
        Self {
            layer,
            stats: NetworkStats::of(graph),
            lanes,
            segments,
            signs: &graph.signs,
            lights: &graph.lights,
        }
    }
}

impl<'a> LaneNetworkView<'a> {
    pub fn new(network: &'a SublayeredGraph) -> Self {
        Self {
            layers: network
                .layers()
                .map(|(layer, graph)| LayerView::new(layer, graph))
                .collect(),
        }
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
