//! Per-lane offset polylines
//!
//! Lanes are spread symmetrically around the edge centerline: lane `i` of
//! `n` sits `((n - 1) / 2 - i) * width` to the left, so neighbouring lanes are
//! exactly one lane width apart and lane 0 is the leftmost.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::geometry::{clamped_offset, max_chord_deviation};
use crate::graph::{Edge, Graph};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetReport {
    pub offset_edges: usize,
    /// Single-lane straight edges whose lane path is the centerline itself
    pub copied_edges: usize,
    /// Lane paths pinched where the raw offset looped at a tight curve
    pub clamped_lanes: usize,
}

/// Left offset of lane `index` from the centerline
pub fn lane_offset(lane_count: u16, index: u16, width: f64) -> f64 {
    ((lane_count as f64 - 1.0) / 2.0 - index as f64) * width
}

/// Returns the number of lanes that needed clamping
fn offset_edge(edge: &mut Edge, tolerance: f64) -> (bool, usize) {
    let curved = max_chord_deviation(&edge.waypoints) > tolerance;
    if edge.lane_count <= 1 && !curved {
        edge.lane_paths = vec![edge.waypoints.clone()];
        return (false, 0);
    }

    let mut clamped = 0;
    edge.lane_paths = (0..edge.lane_count)
        .map(|i| {
            let d = lane_offset(edge.lane_count, i, edge.lane_width);
            let (path, moved) = clamped_offset(&edge.waypoints, d);
            if moved > 0 {
                clamped += 1;
            }
            path
        })
        .collect();
    if clamped > 0 {
        debug!(edge = %edge.id, clamped, "clamped offset lanes at tight curve");
    }
    (true, clamped)
}

pub fn offset_graph(graph: &mut Graph, tolerance: f64) -> OffsetReport {
    let results: Vec<(bool, usize)> = graph
        .edges
        .par_iter_mut()
        .map(|(_, edge)| offset_edge(edge, tolerance))
        .collect();

    let mut report = OffsetReport::default();
    for (offset, clamped) in results {
        if offset {
            report.offset_edges += 1;
        } else {
            report.copied_edges += 1;
        }
        report.clamped_lanes += clamped;
    }
    info!(
        offset_edges = report.offset_edges,
        copied_edges = report.copied_edges,
        clamped_lanes = report.clamped_lanes,
        "offset lanes"
    );
    report
}
