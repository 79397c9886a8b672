//! Traffic-sign and traffic-light annotations
//!
//! Signs bind to the nearest edge by projection onto its centerline; lights
//! bind to the nearest node. Records further away than the cutoff are
//! dropped instead of being matched to something unrelated.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::geometry::{cumulative_lengths, signed_angle, Point, PointExt};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::spatial::{node_index, segment_index};

/// Distances within this of each other count as a tie (m)
const TIE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSign {
    pub id: i64,
    pub point: Point,
    pub kind: String,
    /// Travel direction the sign governs (radians, counter-clockwise from +x)
    #[serde(default)]
    pub heading: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLight {
    pub id: i64,
    pub point: Point,
    #[serde(default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSet {
    #[serde(default)]
    pub signs: Vec<TrafficSign>,
    #[serde(default)]
    pub lights: Vec<TrafficLight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignDirection {
    Forward,
    Backward,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedSign {
    pub sign: TrafficSign,
    pub edge: EdgeId,
    pub direction: SignDirection,
    /// Arc length along the edge centerline of the projected position
    pub station: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedLight {
    pub light: TrafficLight,
    pub node: NodeId,
    pub distance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    pub signs_applied: usize,
    pub signs_dropped: usize,
    pub lights_applied: usize,
    pub lights_dropped: usize,
}

pub fn apply_annotations(
    graph: &mut Graph,
    annotations: &AnnotationSet,
    max_distance: f64,
) -> AnnotationReport {
    let mut report = AnnotationReport::default();

    let segments = segment_index(graph);
    for sign in &annotations.signs {
        let p = sign.point;
        let Some((seg, d2)) = segments
            .nearest_neighbor_iter_with_distance_2(&p.as_array())
            .next()
        else {
            report.signs_dropped += 1;
            continue;
        };
        let distance = d2.sqrt();
        if distance > max_distance {
            warn!(sign = sign.id, distance, "traffic sign too far from any edge, dropped");
            report.signs_dropped += 1;
            continue;
        }
        let Some(edge) = graph.edges.get(&seg.edge) else {
            report.signs_dropped += 1;
            continue;
        };

        let lengths = cumulative_lengths(&edge.waypoints);
        let station = lengths[seg.index] + seg.project(p) * seg.from.distance(seg.to);
        let direction = if edge.oneway {
            SignDirection::Forward
        } else {
            match sign.heading {
                Some(h) => {
                    let along = seg.to - seg.from;
                    let facing = Point::new(h.cos(), h.sin());
                    if signed_angle(along, facing).abs() <= std::f64::consts::FRAC_PI_2 {
                        SignDirection::Forward
                    } else {
                        SignDirection::Backward
                    }
                }
                None => SignDirection::Both,
            }
        };

        graph.signs.push(AppliedSign {
            sign: sign.clone(),
            edge: edge.id,
            direction,
            station,
            distance,
        });
        report.signs_applied += 1;
    }

    let nodes = node_index(graph);
    let adjacency = graph.adjacency();
    for light in &annotations.lights {
        let mut candidates = nodes.nearest_neighbor_iter_with_distance_2(&light.point.as_array());
        let Some((first, best_2)) = candidates.next() else {
            report.lights_dropped += 1;
            continue;
        };
        let distance = best_2.sqrt();
        if distance > max_distance {
            warn!(light = light.id, distance, "traffic light too far from any node, dropped");
            report.lights_dropped += 1;
            continue;
        }

        // Among equally near nodes prefer an intersection, then the lowest id
        let degree = |id: &NodeId| adjacency.get(id).map_or(0, Vec::len);
        let mut chosen = first.id;
        for (candidate, d2) in candidates {
            if d2.sqrt() - distance > TIE_EPSILON {
                break;
            }
            let better = (degree(&candidate.id) >= 3, std::cmp::Reverse(candidate.id))
                > (degree(&chosen) >= 3, std::cmp::Reverse(chosen));
            if better {
                chosen = candidate.id;
            }
        }

        graph.lights.push(AppliedLight {
            light: light.clone(),
            node: chosen,
            distance,
        });
        report.lights_applied += 1;
    }

    info!(
        signs = report.signs_applied,
        signs_dropped = report.signs_dropped,
        lights = report.lights_applied,
        lights_dropped = report.lights_dropped,
        "applied annotations"
    );
    report
}
