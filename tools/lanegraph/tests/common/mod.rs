#![allow(dead_code)]

use lanegraph::geometry::Point;
use lanegraph::graph::{EdgeId, NodeId};
use lanegraph::{Graph, SourceNode, SourceWay, Topology};
use std::collections::BTreeMap;

pub fn node(id: i64, x: f64, y: f64) -> SourceNode {
    SourceNode {
        id,
        x,
        y,
        tags: BTreeMap::new(),
    }
}

/// Two-way residential way with default lanes
pub fn way(id: i64, nodes: &[i64]) -> SourceWay {
    SourceWay {
        id,
        nodes: nodes.to_vec(),
        lanes: None,
        forward_lanes: None,
        oneway: false,
        road_class: "residential".to_string(),
    }
}

/// Plus-shaped crossing at the origin with arms of `arm` metres.
/// Source node 0 is the centre; 1..=4 are east, north, west, south.
pub fn crossing(arm: f64) -> Topology {
    Topology {
        nodes: vec![
            node(0, 0.0, 0.0),
            node(1, arm, 0.0),
            node(2, 0.0, arm),
            node(3, -arm, 0.0),
            node(4, 0.0, -arm),
        ],
        ways: vec![way(100, &[3, 0, 1]), way(101, &[4, 0, 2])],
    }
}

/// Two north-south roads `gap` metres apart joined by a short east-west
/// edge at y = 0.
pub fn ladder(gap: f64) -> Topology {
    Topology {
        nodes: vec![
            node(1, 0.0, -40.0),
            node(2, 0.0, 0.0),
            node(3, 0.0, 40.0),
            node(4, gap, -40.0),
            node(5, gap, 0.0),
            node(6, gap, 40.0),
        ],
        ways: vec![
            way(10, &[1, 2, 3]),
            way(11, &[4, 5, 6]),
            way(12, &[2, 5]),
        ],
    }
}

/// A few blocks with doubled-up junction nodes and a curved street
pub fn town() -> Topology {
    let mut nodes = Vec::new();
    let mut ways = Vec::new();
    for row in 0..3 {
        for col in 0..3 {
            let id = row * 3 + col;
            nodes.push(node(id, col as f64 * 60.0, row as f64 * 60.0));
        }
    }
    // Near-duplicates of the middle junction, chained by short gaps
    nodes.push(node(20, 60.8, 60.0));
    nodes.push(node(21, 61.6, 60.3));
    for row in 0..3 {
        let r = row * 3;
        ways.push(way(100 + r, &[r, r + 1, r + 2]));
    }
    ways.push(way(200, &[0, 3, 6]));
    ways.push(way(201, &[1, 4, 7]));
    ways.push(way(202, &[2, 5, 8]));
    ways.push(way(300, &[21, 20]));
    // Curved street bulging out of the grid
    nodes.push(node(30, 150.0, 20.0));
    nodes.push(node(31, 165.0, 60.0));
    nodes.push(node(32, 150.0, 100.0));
    ways.push(way(301, &[2, 30, 31, 32, 8]));
    Topology { nodes, ways }
}

/// Two-way road with `lanes` lanes doubling back round a semicircle of
/// `radius` metres. The legs flare out to end 20 m apart.
pub fn hairpin(radius: f64, lanes: u16) -> Topology {
    let mut nodes = vec![node(0, -10.0, 20.0)];
    for k in 0..=12 {
        let theta = std::f64::consts::PI * (1.0 + k as f64 / 12.0);
        nodes.push(node(k + 1, radius * theta.cos(), radius * theta.sin()));
    }
    nodes.push(node(14, 10.0, 20.0));
    let mut road = way(100, &(0..=14).collect::<Vec<_>>());
    road.lanes = Some(lanes);
    Topology {
        nodes,
        ways: vec![road],
    }
}

/// Straight east-west road with a three-lane arm leaving the origin at
/// 35 degrees below the east leg
pub fn junction() -> Topology {
    let angle = (-35.0f64).to_radians();
    let mut arm = way(101, &[0, 3]);
    arm.lanes = Some(3);
    Topology {
        nodes: vec![
            node(0, 0.0, 0.0),
            node(1, 50.0, 0.0),
            node(2, -50.0, 0.0),
            node(3, 50.0 * angle.cos(), 50.0 * angle.sin()),
        ],
        ways: vec![way(100, &[2, 0, 1]), arm],
    }
}

/// Node positions and edge endpoints, for comparing graphs
pub fn fingerprint(graph: &Graph) -> (Vec<(NodeId, Point)>, Vec<(EdgeId, NodeId, NodeId)>) {
    (
        graph.nodes.values().map(|n| (n.id, n.point)).collect(),
        graph.edges.values().map(|e| (e.id, e.from, e.to)).collect(),
    )
}
