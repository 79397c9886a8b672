//! Lane deletion and endpoint snapping
//!
//! Endpoint snapping works on "slots": one end of one polyline (centerline,
//! left bound or right bound) of a lane or segment. Slots that must coincide
//! are unioned; each resulting class is moved to the centroid of its members
//! so every member ends up with the identical coordinate.

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::geometry::{centroid, self_intersects, Point, PointExt};
use crate::graph::{ConnectionKind, Graph, LaneId, SegmentId};
use crate::union_find::UnionFind;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted_lanes: usize,
    pub deleted_segments: usize,
}

fn polyline_is_valid(centerline: &[Point], width: f64, left: &[Point], right: &[Point]) -> bool {
    centerline.len() >= 2
        && width.is_finite()
        && width > 0.0
        && !self_intersects(left)
        && !self_intersects(right)
}

/// Remove lanes (and segments) with too few points, no width, or a
/// self-intersecting boundary, together with every reference to them.
pub fn delete_invalid_lanes(graph: &mut Graph) -> DeleteReport {
    let lanes: BTreeSet<LaneId> = graph
        .lanes
        .par_iter()
        .filter(|(_, l)| !polyline_is_valid(&l.centerline, l.width, &l.left_bound, &l.right_bound))
        .map(|(id, _)| *id)
        .collect();
    let segments: BTreeSet<SegmentId> = graph
        .segments
        .par_iter()
        .filter(|(_, s)| !polyline_is_valid(&s.centerline, s.width, &s.left_bound, &s.right_bound))
        .map(|(id, _)| *id)
        .collect();

    for lane in &lanes {
        warn!(%lane, "deleting invalid lane");
    }
    let segments_before = graph.segments.len();
    graph.delete_segments(&segments);
    graph.delete_lanes(&lanes);

    let report = DeleteReport {
        deleted_lanes: lanes.len(),
        deleted_segments: segments_before - graph.segments.len(),
    };
    info!(
        deleted_lanes = report.deleted_lanes,
        deleted_segments = report.deleted_segments,
        "deleted invalid lanes"
    );
    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    Lane(LaneId),
    Segment(SegmentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    Center,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum End {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    pub element: Element,
    pub side: Side,
    pub end: End,
}

impl Slot {
    fn new(element: Element, side: Side, end: End) -> Self {
        Self { element, side, end }
    }
}

const SIDES: [Side; 3] = [Side::Center, Side::Left, Side::Right];

fn polyline<'a>(graph: &'a Graph, element: Element, side: Side) -> Option<&'a Vec<Point>> {
    match element {
        Element::Lane(id) => graph.lanes.get(&id).map(|l| match side {
            Side::Center => &l.centerline,
            Side::Left => &l.left_bound,
            Side::Right => &l.right_bound,
        }),
        Element::Segment(id) => graph.segments.get(&id).map(|s| match side {
            Side::Center => &s.centerline,
            Side::Left => &s.left_bound,
            Side::Right => &s.right_bound,
        }),
    }
}

fn polyline_mut<'a>(graph: &'a mut Graph, element: Element, side: Side) -> Option<&'a mut Vec<Point>> {
    match element {
        Element::Lane(id) => graph.lanes.get_mut(&id).map(|l| match side {
            Side::Center => &mut l.centerline,
            Side::Left => &mut l.left_bound,
            Side::Right => &mut l.right_bound,
        }),
        Element::Segment(id) => graph.segments.get_mut(&id).map(|s| match side {
            Side::Center => &mut s.centerline,
            Side::Left => &mut s.left_bound,
            Side::Right => &mut s.right_bound,
        }),
    }
}

/// Current coordinate of a slot, if the polyline exists and is non-empty
pub fn slot_point(graph: &Graph, slot: Slot) -> Option<Point> {
    let line = polyline(graph, slot.element, slot.side)?;
    match slot.end {
        End::Start => line.first().copied(),
        End::End => line.last().copied(),
    }
}

fn set_slot(graph: &mut Graph, slot: Slot, point: Point) {
    if let Some(line) = polyline_mut(graph, slot.element, slot.side) {
        let target = match slot.end {
            End::Start => line.first_mut(),
            End::End => line.last_mut(),
        };
        if let Some(p) = target {
            *p = point;
        }
    }
}

/// Every pair of slots that must share one coordinate:
/// side-by-side lanes of an edge share their touching boundaries at both
/// edge ends, continuing lanes meet end to start, and a segment starts
/// where its incoming lane ends and ends where its outgoing lane starts.
pub fn endpoint_links(graph: &Graph) -> Vec<(Slot, Slot)> {
    let mut links = Vec::new();

    for edge in graph.edges.values() {
        for k in 1..edge.lane_count {
            let (a, b) = (LaneId::new(edge.id, k - 1), LaneId::new(edge.id, k));
            let (Some(la), Some(lb)) = (graph.lanes.get(&a), graph.lanes.get(&b)) else {
                continue;
            };
            // Lane a's edge-right boundary touches lane b's edge-left boundary
            let a_side = if la.forward { Side::Right } else { Side::Left };
            let b_side = if lb.forward { Side::Left } else { Side::Right };
            for at_edge_end in [false, true] {
                let end_of = |forward: bool| if forward == at_edge_end { End::End } else { End::Start };
                links.push((
                    Slot::new(Element::Lane(a), a_side, end_of(la.forward)),
                    Slot::new(Element::Lane(b), b_side, end_of(lb.forward)),
                ));
            }
        }
    }

    for node_links in graph.lane_links.values() {
        for c in &node_links.connections {
            if c.kind != ConnectionKind::Continuation {
                continue;
            }
            if !(graph.lanes.contains_key(&c.from) && graph.lanes.contains_key(&c.to)) {
                continue;
            }
            for side in SIDES {
                links.push((
                    Slot::new(Element::Lane(c.from), side, End::End),
                    Slot::new(Element::Lane(c.to), side, End::Start),
                ));
            }
        }
    }

    for segment in graph.segments.values() {
        let seg = Element::Segment(segment.id);
        for side in SIDES {
            if graph.lanes.contains_key(&segment.from) {
                links.push((
                    Slot::new(Element::Lane(segment.from), side, End::End),
                    Slot::new(seg, side, End::Start),
                ));
            }
            if graph.lanes.contains_key(&segment.to) {
                links.push((
                    Slot::new(seg, side, End::End),
                    Slot::new(Element::Lane(segment.to), side, End::Start),
                ));
            }
        }
    }

    links.retain(|(a, b)| slot_point(graph, *a).is_some() && slot_point(graph, *b).is_some());
    links
}

/// Largest distance between any two slots that must coincide
pub fn max_endpoint_gap(graph: &Graph) -> f64 {
    endpoint_links(graph)
        .into_iter()
        .filter_map(|(a, b)| Some(slot_point(graph, a)?.distance(slot_point(graph, b)?)))
        .fold(0.0, f64::max)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapReport {
    pub classes: usize,
    pub snapped_points: usize,
    /// Largest distance any point was moved
    pub max_shift: f64,
}

pub fn correct_start_end_points(graph: &mut Graph) -> SnapReport {
    let links = endpoint_links(graph);

    let slots: Vec<Slot> = links
        .iter()
        .flat_map(|(a, b)| [*a, *b])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let index: BTreeMap<Slot, usize> = slots.iter().enumerate().map(|(i, s)| (*s, i)).collect();

    let mut uf = UnionFind::new(slots.len());
    for (a, b) in &links {
        uf.union(index[a], index[b]);
    }

    let mut report = SnapReport::default();
    for class in uf.groups() {
        let members: Vec<(Slot, Point)> = class
            .iter()
            .filter_map(|&i| Some((slots[i], slot_point(graph, slots[i])?)))
            .collect();
        if members.len() < 2 {
            continue;
        }
        let Some(center) = centroid(members.iter().map(|(_, p)| *p)) else {
            continue;
        };
        for (slot, p) in &members {
            report.max_shift = report.max_shift.max(p.distance(center));
            set_slot(graph, *slot, center);
        }
        report.classes += 1;
        report.snapped_points += members.len();
    }

    info!(
        classes = report.classes,
        snapped = report.snapped_points,
        max_shift = report.max_shift,
        "corrected lane start and end points"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        EdgeId, Lane, LaneConnection, LaneLinkSegment, NodeId, NodeLaneLinks, TurnDirection,
    };

    fn lane(edge: u64, points: Vec<Point>) -> Lane {
        let left = crate::geometry::offset_vertices(&points, 1.5);
        let right = crate::geometry::offset_vertices(&points, -1.5);
        Lane {
            id: LaneId::new(EdgeId(edge), 0),
            forward: true,
            width: 3.0,
            centerline: points,
            left_bound: left,
            right_bound: right,
            predecessors: Vec::new(),
            successors: Vec::new(),
        }
    }

    #[test]
    fn test_delete_invalid_lanes_purges_links() {
        let mut g = Graph::new();
        let good = lane(0, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let mut bad = lane(1, vec![Point::new(10.0, 0.0), Point::new(20.0, 0.0)]);
        bad.width = 0.0;
        let (gid, bid) = (good.id, bad.id);
        g.lanes.insert(gid, good);
        g.lanes.insert(bid, bad);
        g.lane_links.insert(
            NodeId(1),
            NodeLaneLinks {
                incoming: vec![gid],
                outgoing: vec![bid],
                connections: vec![LaneConnection {
                    node: NodeId(1),
                    from: gid,
                    to: bid,
                    kind: ConnectionKind::Continuation,
                }],
            },
        );

        let report = delete_invalid_lanes(&mut g);
        assert_eq!(report.deleted_lanes, 1);
        assert!(g.lane_links[&NodeId(1)].connections.is_empty());
        assert!(g.lane_links[&NodeId(1)].outgoing.is_empty());
    }

    #[test]
    fn test_invalid_segment_takes_its_turn_along() {
        let mut g = Graph::new();
        let mut a = lane(0, vec![Point::new(-10.0, 0.0), Point::new(0.0, 0.0)]);
        let mut b = lane(1, vec![Point::new(5.0, 5.0), Point::new(5.0, 15.0)]);
        let (aid, bid) = (a.id, b.id);
        a.successors = vec![bid];
        b.predecessors = vec![aid];
        g.lanes.insert(aid, a);
        g.lanes.insert(bid, b);
        g.lane_links.insert(
            NodeId(1),
            NodeLaneLinks {
                incoming: vec![aid],
                outgoing: vec![bid],
                connections: vec![LaneConnection {
                    node: NodeId(1),
                    from: aid,
                    to: bid,
                    kind: ConnectionKind::Turn(TurnDirection::Left),
                }],
            },
        );
        let centerline = vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)];
        g.segments.insert(
            SegmentId(0),
            LaneLinkSegment {
                id: SegmentId(0),
                node: NodeId(1),
                from: aid,
                to: bid,
                turn: TurnDirection::Left,
                width: 0.0,
                left_bound: centerline.clone(),
                right_bound: centerline.clone(),
                centerline,
                cluster: None,
            },
        );

        let report = delete_invalid_lanes(&mut g);
        assert_eq!((report.deleted_lanes, report.deleted_segments), (0, 1));
        assert!(g.segments.is_empty());
        assert!(g.lanes[&aid].successors.is_empty());
        assert!(g.lanes[&bid].predecessors.is_empty());
        assert!(g.lane_links[&NodeId(1)].connections.is_empty());
    }

    #[test]
    fn test_snap_continuation_closes_gap() {
        let mut g = Graph::new();
        let a = lane(0, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let b = lane(1, vec![Point::new(10.0, 0.4), Point::new(10.0, 10.0)]);
        let (aid, bid) = (a.id, b.id);
        g.lanes.insert(aid, a);
        g.lanes.insert(bid, b);
        g.lane_links.insert(
            NodeId(0),
            NodeLaneLinks {
                incoming: vec![aid],
                outgoing: vec![bid],
                connections: vec![LaneConnection {
                    node: NodeId(0),
                    from: aid,
                    to: bid,
                    kind: ConnectionKind::Continuation,
                }],
            },
        );
        assert!(max_endpoint_gap(&g) > 0.1);

        let report = correct_start_end_points(&mut g);
        assert_eq!(report.classes, 3);
        assert_eq!(max_endpoint_gap(&g), 0.0);
        assert_eq!(g.lanes[&aid].centerline[1], Point::new(10.0, 0.2));
    }
}
