mod common;

use common::{crossing, fingerprint, ladder, town};
use lanegraph::geometry::{Point, PointExt};
use lanegraph::graph::{Lane, LaneId};
use lanegraph::interpolate::interpolate_graph;
use lanegraph::merge::{close_pairs, clusters_from_pairs, merge_close_intersections};
use lanegraph::validate::{max_endpoint_gap, BOUNDARY_EPSILON};
use lanegraph::{AnnotationSet, Conversion, ConversionConfig, Graph, NetworkInput};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[test]
fn test_merge_is_idempotent() {
    let mut graph = Graph::from_topology(&town(), &ConversionConfig::default()).unwrap();
    let first = merge_close_intersections(&mut graph, 1.0);
    assert!(first.merged_nodes > 0);
    let once = fingerprint(&graph);

    let second = merge_close_intersections(&mut graph, 1.0);
    assert_eq!(second.merged_nodes, 0);
    assert_eq!(second.removed_loops, 0);
    assert_eq!(fingerprint(&graph), once);
}

#[test]
fn test_merge_clusters_ignore_pair_order() {
    let graph = Graph::from_topology(&town(), &ConversionConfig::default()).unwrap();
    let pairs = close_pairs(&graph, 12.0);
    assert!(!pairs.is_empty());
    let expected = clusters_from_pairs(&pairs);

    for seed in 0..16 {
        let mut shuffled = pairs.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(seed));
        // Flipping a pair must not matter either
        for pair in shuffled.iter_mut().step_by(2) {
            *pair = (pair.1, pair.0);
        }
        assert_eq!(clusters_from_pairs(&shuffled), expected, "seed {seed}");
    }
}

#[test]
fn test_interpolation_preserves_endpoints() {
    let mut graph = Graph::from_topology(&town(), &ConversionConfig::default()).unwrap();
    let before: Vec<_> = graph
        .edges
        .values()
        .map(|e| (e.id, e.waypoints[0], *e.waypoints.last().unwrap()))
        .collect();

    interpolate_graph(&mut graph, 0.25);

    for (id, first, last) in before {
        let edge = &graph.edges[&id];
        assert_eq!(edge.waypoints[0], first);
        assert_eq!(*edge.waypoints.last().unwrap(), last);
        assert!(edge
            .waypoints
            .windows(2)
            .all(|w| w[0].distance(w[1]) <= 0.25 + 1e-9));
    }
}

fn convert(input: NetworkInput) -> Conversion {
    let mut conversion = Conversion::from_input(&input, ConversionConfig::default()).unwrap();
    conversion.run(AnnotationSet::default()).unwrap();
    conversion
}

#[test]
fn test_linked_endpoints_coincide_after_repair() {
    for topology in [town(), crossing(50.0)] {
        let conversion = convert(NetworkInput {
            primary: topology,
            sublayer: None,
        });
        let graph = &conversion.network.graph;
        assert!(!graph.segments.is_empty());
        assert!(max_endpoint_gap(graph) <= BOUNDARY_EPSILON);
    }
}

/// A lane's bound on the given side of its edge, ordered along the edge
fn edge_side(lane: &Lane, right: bool) -> Vec<Point> {
    let mut bound = if right == lane.forward {
        lane.right_bound.clone()
    } else {
        lane.left_bound.clone()
    };
    if !lane.forward {
        bound.reverse();
    }
    bound
}

fn assert_meet(a: Option<&Point>, b: Option<&Point>, what: &str) {
    let (a, b) = (a.copied().unwrap(), b.copied().unwrap());
    assert!(a.distance(b) <= BOUNDARY_EPSILON, "{what}: {a:?} vs {b:?}");
}

#[test]
fn test_connected_geometry_is_watertight() {
    for topology in [town(), crossing(50.0)] {
        let conversion = convert(NetworkInput {
            primary: topology,
            sublayer: None,
        });
        let graph = &conversion.network.graph;

        for s in graph.segments.values() {
            let (from, to) = (&graph.lanes[&s.from], &graph.lanes[&s.to]);
            let pairs = [
                (&s.centerline, &from.centerline, &to.centerline),
                (&s.left_bound, &from.left_bound, &to.left_bound),
                (&s.right_bound, &from.right_bound, &to.right_bound),
            ];
            for (seg, incoming, outgoing) in pairs {
                assert_meet(seg.first(), incoming.last(), &format!("{} start", s.id));
                assert_meet(seg.last(), outgoing.first(), &format!("{} end", s.id));
            }
        }

        let mut shared = 0;
        for edge in graph.edges.values() {
            for k in 1..edge.lane_count {
                let (Some(a), Some(b)) = (
                    graph.lanes.get(&LaneId::new(edge.id, k - 1)),
                    graph.lanes.get(&LaneId::new(edge.id, k)),
                ) else {
                    continue;
                };
                let (right_of_a, left_of_b) = (edge_side(a, true), edge_side(b, false));
                assert_meet(right_of_a.first(), left_of_b.first(), &format!("{} start", edge.id));
                assert_meet(right_of_a.last(), left_of_b.last(), &format!("{} end", edge.id));
                shared += 1;
            }
        }
        assert!(shared > 0);
    }
}

#[test]
fn test_no_dangling_references() {
    let conversion = convert(NetworkInput {
        primary: town(),
        sublayer: Some(ladder(8.0)),
    });
    for (_, graph) in conversion.network.layers() {
        for edge in graph.edges.values() {
            assert!(graph.nodes.contains_key(&edge.from));
            assert!(graph.nodes.contains_key(&edge.to));
        }
        for segment in graph.segments.values() {
            assert!(graph.lanes.contains_key(&segment.from), "{} dangles", segment.id);
            assert!(graph.lanes.contains_key(&segment.to), "{} dangles", segment.id);
        }
        for lane in graph.lanes.values() {
            for other in lane.predecessors.iter().chain(&lane.successors) {
                assert!(graph.lanes.contains_key(other));
            }
        }
    }
}
