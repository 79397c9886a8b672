//! Cropping near intersections
//!
//! Lane paths are cut back to a circle of `radius` around every
//! intersection node they touch so that converging edges stop overlapping.
//! The edge centerline is left untouched; the length it would keep is
//! recorded in `trimmed_length`.

use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::geometry::{crop_end, crop_start, polyline_length, Point};
use crate::graph::{Edge, EdgeId, Graph, NodeId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CropReport {
    pub cropped_edges: usize,
    /// Edges left shorter than the minimum viable length, or that could not
    /// be cropped at all. Candidates for deletion.
    pub short_edges: Vec<EdgeId>,
}

/// Ends of an edge that get cropped, with the node position to crop around
#[derive(Debug, Clone, Copy)]
struct CropEnds {
    start: Option<Point>,
    end: Option<Point>,
}

fn crop_path(path: &[Point], ends: CropEnds, radius: f64) -> Option<Vec<Point>> {
    let mut out = path.to_vec();
    if let Some(center) = ends.start {
        out = crop_start(&out, center, radius)?;
    }
    if let Some(center) = ends.end {
        out = crop_end(&out, center, radius)?;
    }
    (out.len() >= 2).then_some(out)
}

enum Outcome {
    Untouched,
    Cropped { short: bool },
    Failed,
}

fn crop_edge(edge: &mut Edge, ends: CropEnds, radius: f64, min_length: f64) -> Outcome {
    if ends.start.is_none() && ends.end.is_none() {
        edge.trimmed_length = Some(edge.length());
        return Outcome::Untouched;
    }

    let Some(center) = crop_path(&edge.waypoints, ends, radius) else {
        edge.trimmed_length = Some(0.0);
        return Outcome::Failed;
    };
    let lanes: Option<Vec<Vec<Point>>> = edge
        .lane_paths
        .iter()
        .map(|p| crop_path(p, ends, radius))
        .collect();
    let Some(lanes) = lanes else {
        edge.trimmed_length = Some(0.0);
        return Outcome::Failed;
    };

    let length = polyline_length(&center);
    edge.lane_paths = lanes;
    edge.trimmed_length = Some(length);
    Outcome::Cropped {
        short: length < min_length,
    }
}

/// Crop every edge end at a node of degree 3 or more
pub fn crop_graph(graph: &mut Graph, radius: f64, min_length: f64) -> CropReport {
    let adjacency = graph.adjacency();
    let intersections: BTreeMap<NodeId, Point> = graph
        .nodes
        .values()
        .filter(|n| adjacency.get(&n.id).is_some_and(|e| e.len() >= 3))
        .map(|n| (n.id, n.point))
        .collect();

    let outcomes: Vec<(EdgeId, Outcome)> = graph
        .edges
        .par_iter_mut()
        .map(|(&id, edge)| {
            let ends = CropEnds {
                start: intersections.get(&edge.from).copied(),
                end: intersections.get(&edge.to).copied(),
            };
            (id, crop_edge(edge, ends, radius, min_length))
        })
        .collect();

    let mut report = CropReport::default();
    for (id, outcome) in outcomes {
        match outcome {
            Outcome::Untouched => {}
            Outcome::Cropped { short } => {
                report.cropped_edges += 1;
                if short {
                    debug!(edge = %id, "edge below minimum length after cropping");
                    report.short_edges.push(id);
                }
            }
            Outcome::Failed => {
                debug!(edge = %id, "edge lies entirely within the intersection radius");
                report.short_edges.push(id);
            }
        }
    }
    info!(
        radius,
        cropped = report.cropped_edges,
        short = report.short_edges.len(),
        "cropped edges at intersections"
    );
    report
}
