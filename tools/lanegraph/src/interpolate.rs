//! Waypoint densification

use rayon::prelude::*;
use tracing::info;

use crate::geometry::densify;
use crate::graph::Graph;

/// Densify every edge centerline to at most `spacing` between waypoints.
/// Original vertices (and so both endpoints) are kept exactly.
pub fn interpolate_graph(graph: &mut Graph, spacing: f64) -> usize {
    graph.edges.par_iter_mut().for_each(|(_, edge)| {
        edge.waypoints = densify(&edge.waypoints, spacing);
    });
    let waypoints: usize = graph.edges.values().map(|e| e.waypoints.len()).sum();
    info!(spacing, edges = graph.edges.len(), waypoints, "interpolated edges");
    waypoints
}
