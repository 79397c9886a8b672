//! Segment clustering
//!
//! Lane-link segments at one intersection that perform the same maneuver
//! share a cluster id. Two segments are equivalent when they turn the same
//! way, bend by a comparable mean curvature, and enter along the same axis
//! (so opposing straight-through movements of a crossing fall together).

use std::collections::BTreeMap;
use tracing::info;

use crate::geometry::{axis_difference, mean_curvature, start_direction, PointExt};
use crate::graph::{ClusterId, Graph, NodeId, SegmentId, TurnDirection};

/// What a segment is compared on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManeuverSignature {
    pub turn: TurnDirection,
    pub curvature: f64,
    /// Entry heading in radians; compared modulo π
    pub entry_axis: f64,
}

impl ManeuverSignature {
    fn matches(&self, other: &ManeuverSignature, angle_tol: f64, curvature_tol: f64) -> bool {
        self.turn == other.turn
            && (self.curvature - other.curvature).abs() <= curvature_tol
            && axis_difference(self.entry_axis, other.entry_axis) <= angle_tol
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterReport {
    pub segments: usize,
    pub clusters: usize,
}

/// Assign cluster ids. `angle_tolerance` is in degrees, `curvature_tolerance`
/// in 1/m. Segments are visited per node in id order, each joining the first
/// existing cluster whose founding segment it matches.
pub fn cluster_segments(
    graph: &mut Graph,
    angle_tolerance: f64,
    curvature_tolerance: f64,
) -> ClusterReport {
    let angle_tol = angle_tolerance.to_radians();

    let mut by_node: BTreeMap<NodeId, Vec<(SegmentId, ManeuverSignature)>> = BTreeMap::new();
    for segment in graph.segments.values() {
        let entry_axis = start_direction(&segment.centerline)
            .map(|d| d.heading())
            .unwrap_or(0.0);
        by_node.entry(segment.node).or_default().push((
            segment.id,
            ManeuverSignature {
                turn: segment.turn,
                curvature: mean_curvature(&segment.centerline),
                entry_axis,
            },
        ));
    }

    let mut assignment: Vec<(SegmentId, ClusterId)> = Vec::new();
    let mut report = ClusterReport::default();
    for members in by_node.values() {
        let mut founders: Vec<(ClusterId, ManeuverSignature)> = Vec::new();
        for (segment, signature) in members {
            let existing = founders
                .iter()
                .find(|(_, f)| signature.matches(f, angle_tol, curvature_tolerance))
                .map(|(id, _)| *id);
            let cluster = match existing {
                Some(id) => id,
                None => {
                    let id = graph.ids_mut().cluster();
                    founders.push((id, *signature));
                    id
                }
            };
            assignment.push((*segment, cluster));
        }
        report.clusters += founders.len();
    }

    for (segment, cluster) in assignment {
        if let Some(s) = graph.segments.get_mut(&segment) {
            s.cluster = Some(cluster);
            report.segments += 1;
        }
    }
    info!(
        segments = report.segments,
        clusters = report.clusters,
        "clustered lane-link segments"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_axis_is_direction_free() {
        let north = ManeuverSignature {
            turn: TurnDirection::Straight,
            curvature: 0.0,
            entry_axis: std::f64::consts::FRAC_PI_2,
        };
        let south = ManeuverSignature {
            entry_axis: -std::f64::consts::FRAC_PI_2,
            ..north
        };
        let east = ManeuverSignature {
            entry_axis: 0.0,
            ..north
        };
        let tol = 15f64.to_radians();
        assert!(north.matches(&south, tol, 0.02));
        assert!(!north.matches(&east, tol, 0.02));

        let left = ManeuverSignature {
            turn: TurnDirection::Left,
            ..north
        };
        assert!(!north.matches(&left, tol, 0.02));
    }
}
