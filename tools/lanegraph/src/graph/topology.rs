//! Parsed source topology and initial graph construction
//!
//! An external parser produces [`Topology`] from the raw map data. Here it is
//! turned into a node-based graph whose nodes are decision points only:
//! way endpoints and nodes shared by several ways (or visited twice by
//! one way). Every other node becomes a waypoint of the edge it lies on.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::{Edge, Graph, Node, NodeId};
use crate::config::ConversionConfig;
use crate::error::{ConvertError, Result};
use crate::geometry::{Point, PointExt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    pub id: i64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceWay {
    pub id: i64,
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub lanes: Option<u16>,
    #[serde(default)]
    pub forward_lanes: Option<u16>,
    #[serde(default)]
    pub oneway: bool,
    #[serde(default)]
    pub road_class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<SourceNode>,
    pub ways: Vec<SourceWay>,
}

/// Input for one conversion: the primary network and an optional sublayer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInput {
    pub primary: Topology,
    #[serde(default)]
    pub sublayer: Option<Topology>,
}

/// Lane totals for a way: (lane_count, forward_lanes)
fn lane_split(way: &SourceWay) -> (u16, u16) {
    if way.oneway {
        let lanes = way.lanes.unwrap_or(1).max(1);
        return (lanes, lanes);
    }
    let lanes = way.lanes.unwrap_or(2).max(2);
    let forward = way
        .forward_lanes
        .unwrap_or(lanes.div_ceil(2))
        .clamp(1, lanes - 1);
    (lanes, forward)
}

impl Graph {
    /// Build the initial graph, splitting ways at decision nodes
    pub fn from_topology(topology: &Topology, config: &ConversionConfig) -> Result<Graph> {
        let source_nodes: HashMap<i64, &SourceNode> =
            topology.nodes.iter().map(|n| (n.id, n)).collect();

        // Consecutive duplicate refs carry no geometry
        let mut ways: Vec<(&SourceWay, Vec<i64>)> = Vec::with_capacity(topology.ways.len());
        for way in &topology.ways {
            let mut refs = way.nodes.clone();
            refs.dedup();
            if refs.len() < 2 {
                return Err(ConvertError::DegenerateWay { way: way.id });
            }
            if let Some(missing) = refs.iter().find(|r| !source_nodes.contains_key(r)) {
                return Err(ConvertError::UnknownNodeRef {
                    way: way.id,
                    node: *missing,
                });
            }
            ways.push((way, refs));
        }

        let mut use_count: HashMap<i64, u32> = HashMap::new();
        for (_, refs) in &ways {
            for r in refs {
                *use_count.entry(*r).or_default() += 1;
            }
        }

        let mut graph = Graph::new();
        let mut decision: HashMap<i64, NodeId> = HashMap::new();

        for (way, refs) in &ways {
            let last = refs.len() - 1;
            let mut start = 0;
            for i in 1..=last {
                let is_decision =
                    i == last || use_count.get(&refs[i]).copied().unwrap_or(0) > 1;
                if !is_decision {
                    continue;
                }

                let from = decision_node(&mut graph, &mut decision, &source_nodes, way.id, refs[start])?;
                let to = decision_node(&mut graph, &mut decision, &source_nodes, way.id, refs[i])?;
                let waypoints: Vec<Point> = refs[start..=i]
                    .iter()
                    .filter_map(|r| source_nodes.get(r))
                    .map(|n| Point::new(n.x, n.y))
                    .collect();

                let (lane_count, forward_lanes) = lane_split(way);
                let id = graph.ids_mut().edge();
                let mut edge = Edge::new(id, from, to, waypoints);
                edge.source_way = Some(way.id);
                edge.road_class = way.road_class.clone();
                edge.lane_count = lane_count;
                edge.forward_lanes = forward_lanes;
                edge.oneway = way.oneway;
                edge.lane_width = config.lane_width_for(&way.road_class);
                graph.insert_edge(edge)?;

                start = i;
            }
            debug!(way = way.id, refs = refs.len(), "split way");
        }

        info!(
            ways = topology.ways.len(),
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "built graph from topology"
        );
        Ok(graph)
    }
}

fn decision_node(
    graph: &mut Graph,
    decision: &mut HashMap<i64, NodeId>,
    source_nodes: &HashMap<i64, &SourceNode>,
    way: i64,
    source_id: i64,
) -> Result<NodeId> {
    if let Some(id) = decision.get(&source_id) {
        return Ok(*id);
    }
    let source = source_nodes
        .get(&source_id)
        .ok_or(ConvertError::UnknownNodeRef {
            way,
            node: source_id,
        })?;
    let id = graph.ids_mut().node();
    let mut node = Node::new(id, Point::new(source.x, source.y));
    node.source_id = Some(source_id);
    node.tags = source.tags.clone();
    graph.insert_node(node);
    decision.insert(source_id, id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, x: f64, y: f64) -> SourceNode {
        SourceNode {
            id,
            x,
            y,
            tags: BTreeMap::new(),
        }
    }

    fn way(id: i64, nodes: Vec<i64>, oneway: bool) -> SourceWay {
        SourceWay {
            id,
            nodes,
            lanes: None,
            forward_lanes: None,
            oneway,
            road_class: "residential".to_string(),
        }
    }

    #[test]
    fn test_split_at_shared_node() {
        // Way 1 runs 1-2-3-4-5, way 2 crosses it at node 3
        let topology = Topology {
            nodes: vec![
                node(1, 0.0, 0.0),
                node(2, 10.0, 0.0),
                node(3, 20.0, 0.0),
                node(4, 30.0, 0.0),
                node(5, 40.0, 0.0),
                node(6, 20.0, -10.0),
                node(7, 20.0, 10.0),
            ],
            ways: vec![way(1, vec![1, 2, 3, 4, 5], false), way(2, vec![6, 3, 7], true)],
        };
        let g = Graph::from_topology(&topology, &ConversionConfig::default()).unwrap();

        // Decision nodes: 1, 3, 5, 6, 7
        assert_eq!(g.nodes.len(), 5);
        assert_eq!(g.edges.len(), 4);
        let long: Vec<_> = g.edges.values().filter(|e| e.waypoints.len() == 3).collect();
        assert_eq!(long.len(), 2, "nodes 2 and 4 become waypoints");

        let crossing = g.nodes.values().find(|n| n.source_id == Some(3)).unwrap();
        assert_eq!(g.degree(crossing.id), 4);
    }

    #[test]
    fn test_lane_defaults() {
        assert_eq!(lane_split(&way(1, vec![], true)), (1, 1));
        assert_eq!(lane_split(&way(1, vec![], false)), (2, 1));

        let mut w = way(1, vec![], false);
        w.lanes = Some(3);
        assert_eq!(lane_split(&w), (3, 2));
        w.lanes = Some(1);
        assert_eq!(lane_split(&w), (2, 1), "two-way roads keep one lane per direction");
        w.lanes = Some(4);
        w.forward_lanes = Some(9);
        assert_eq!(lane_split(&w), (4, 3));
    }

    #[test]
    fn test_unknown_node_ref() {
        let topology = Topology {
            nodes: vec![node(1, 0.0, 0.0)],
            ways: vec![way(7, vec![1, 42], true)],
        };
        let err = Graph::from_topology(&topology, &ConversionConfig::default()).unwrap_err();
        assert!(matches!(err, ConvertError::UnknownNodeRef { way: 7, node: 42 }));
    }

    #[test]
    fn test_degenerate_way() {
        let topology = Topology {
            nodes: vec![node(1, 0.0, 0.0)],
            ways: vec![way(3, vec![1, 1], true)],
        };
        let err = Graph::from_topology(&topology, &ConversionConfig::default()).unwrap_err();
        assert!(matches!(err, ConvertError::DegenerateWay { way: 3 }));
    }

    #[test]
    fn test_closed_way_becomes_loop() {
        let topology = Topology {
            nodes: vec![node(1, 0.0, 0.0), node(2, 10.0, 0.0), node(3, 5.0, 8.0)],
            ways: vec![way(1, vec![1, 2, 3, 1], true)],
        };
        let g = Graph::from_topology(&topology, &ConversionConfig::default()).unwrap();
        assert_eq!(g.nodes.len(), 1);
        let edge = g.edges.values().next().unwrap();
        assert!(edge.is_loop());
        assert_eq!(edge.waypoints.len(), 4);
    }
}
