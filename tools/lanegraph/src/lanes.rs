//! Lane geometry: lanes, lane-link segments and final boundaries

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::geometry::{
    cubic_bezier, end_direction, offset_polyline, resample, start_direction, Point, PointExt,
};
use crate::graph::{
    ConnectionKind, Edge, Graph, Lane, LaneId, LaneLinkSegment, NodeId, Transition, TurnDirection,
};
use crate::offset::lane_offset;

/// Connectors shorter than this have no usable geometry (m)
const MIN_CONNECTOR_CHORD: f64 = 1e-3;

/// Bézier control arm length relative to the chord
const CONTROL_FRACTION: f64 = 0.4;

fn lanes_of(edge: &Edge) -> Vec<Lane> {
    (0..edge.lane_count)
        .map(|i| {
            let path = edge.lane_paths.get(i as usize).cloned().unwrap_or_else(|| {
                offset_polyline(
                    &edge.waypoints,
                    lane_offset(edge.lane_count, i, edge.lane_width),
                )
            });
            let forward = edge.lane_is_forward(i);
            let centerline = if forward {
                path
            } else {
                path.into_iter().rev().collect()
            };
            Lane {
                id: LaneId::new(edge.id, i),
                forward,
                width: edge.lane_width,
                centerline,
                left_bound: Vec::new(),
                right_bound: Vec::new(),
                predecessors: Vec::new(),
                successors: Vec::new(),
            }
        })
        .collect()
}

/// One lane per lane index of every edge, oriented in travel direction and
/// linked to its neighbours through the node lane links.
pub fn create_lanes(graph: &mut Graph) -> usize {
    let lanes: Vec<Lane> = graph
        .edges
        .par_iter()
        .flat_map_iter(|(_, edge)| lanes_of(edge))
        .collect();
    let mut lanes: BTreeMap<LaneId, Lane> = lanes.into_iter().map(|l| (l.id, l)).collect();

    for links in graph.lane_links.values() {
        for c in &links.connections {
            if !(lanes.contains_key(&c.from) && lanes.contains_key(&c.to)) {
                continue;
            }
            if let Some(lane) = lanes.get_mut(&c.from) {
                lane.successors.push(c.to);
            }
            if let Some(lane) = lanes.get_mut(&c.to) {
                lane.predecessors.push(c.from);
            }
        }
    }
    for lane in lanes.values_mut() {
        lane.successors.sort_unstable();
        lane.successors.dedup();
        lane.predecessors.sort_unstable();
        lane.predecessors.dedup();
    }

    let count = lanes.len();
    graph.lanes = lanes;
    info!(lanes = count, "created lanes");
    count
}

/// Tangent-matched cubic connector from the end of one lane to the start of
/// another, sampled at about `spacing`. `None` when the lanes meet in a
/// point or have no direction.
pub fn connector(from: &Lane, to: &Lane, spacing: f64) -> Option<Vec<Point>> {
    let p0 = *from.centerline.last()?;
    let p3 = *to.centerline.first()?;
    let chord = p0.distance(p3);
    if chord < MIN_CONNECTOR_CHORD {
        return None;
    }
    let t0 = end_direction(&from.centerline)?;
    let t3 = start_direction(&to.centerline)?;

    let arm = chord * CONTROL_FRACTION;
    let p1 = p0 + t0 * arm;
    let p2 = p3 - t3 * arm;
    let hull = p0.distance(p1) + p1.distance(p2) + p2.distance(p3);
    let samples = ((hull / spacing).ceil() as usize + 1).max(2);
    Some(cubic_bezier(p0, p1, p2, p3, samples))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentReport {
    pub created: usize,
    pub skipped: usize,
}

/// One lane-link segment per turn connection at every intersection. Turns
/// without usable connector geometry are dropped from the lane links.
pub fn create_lane_link_segments(graph: &mut Graph, spacing: f64) -> SegmentReport {
    graph.segments.clear();
    let mut report = SegmentReport::default();
    let mut skipped: BTreeSet<Transition> = BTreeSet::new();

    let turns: Vec<(NodeId, LaneId, LaneId, TurnDirection)> = graph
        .lane_links
        .values()
        .flat_map(|links| links.connections.iter())
        .filter_map(|c| match c.kind {
            ConnectionKind::Turn(turn) => Some((c.node, c.from, c.to, turn)),
            ConnectionKind::Continuation => None,
        })
        .collect();

    for (node, from, to, turn) in turns {
        let (Some(a), Some(b)) = (graph.lanes.get(&from), graph.lanes.get(&to)) else {
            skipped.insert((node, from, to));
            continue;
        };
        let Some(centerline) = connector(a, b, spacing) else {
            debug!(%node, %from, %to, "no valid connector geometry, skipping");
            skipped.insert((node, from, to));
            continue;
        };
        let width = (a.width + b.width) / 2.0;
        let id = graph.ids_mut().segment();
        graph.segments.insert(
            id,
            LaneLinkSegment {
                id,
                node,
                from,
                to,
                turn,
                width,
                centerline,
                left_bound: Vec::new(),
                right_bound: Vec::new(),
                cluster: None,
            },
        );
        report.created += 1;
    }
    report.skipped = skipped.len();
    graph.drop_turns(&skipped);

    info!(
        created = report.created,
        skipped = report.skipped,
        "created lane-link segments"
    );
    report
}

/// Left and right boundaries at half a width, clamped at tight curves.
/// Both keep the centerline's point count.
fn bounds(centerline: &[Point], width: f64) -> (Vec<Point>, Vec<Point>) {
    let half = width / 2.0;
    (
        offset_polyline(centerline, half),
        offset_polyline(centerline, -half),
    )
}

/// Resample lanes and segments to the output spacing and derive their
/// left and right boundaries at plus and minus half a lane width.
pub fn create_lane_bounds(graph: &mut Graph, spacing: f64) -> usize {
    graph.lanes.par_iter_mut().for_each(|(_, lane)| {
        lane.centerline = resample(&lane.centerline, spacing);
        (lane.left_bound, lane.right_bound) = bounds(&lane.centerline, lane.width);
    });
    graph.segments.par_iter_mut().for_each(|(_, segment)| {
        segment.centerline = resample(&segment.centerline, spacing);
        (segment.left_bound, segment.right_bound) = bounds(&segment.centerline, segment.width);
    });

    let points: usize = graph
        .lanes
        .values()
        .map(|l| l.left_bound.len() + l.right_bound.len())
        .chain(
            graph
                .segments
                .values()
                .map(|s| s.left_bound.len() + s.right_bound.len()),
        )
        .sum();
    info!(
        spacing,
        lanes = graph.lanes.len(),
        segments = graph.segments.len(),
        points,
        "created lane bounds"
    );
    points
}
