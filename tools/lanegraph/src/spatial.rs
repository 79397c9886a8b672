//! R-tree entries for node and edge-segment lookups

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geometry::{Point, PointExt, Vector2DOps};
use crate::graph::{EdgeId, Graph, NodeId};

/// Node position with its id
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedNode {
    pub coords: [f64; 2],
    pub id: NodeId,
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.coords == *point
    }
}

/// One centerline segment `index..index + 1` of an edge
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedSegment {
    pub from: Point,
    pub to: Point,
    pub edge: EdgeId,
    pub index: usize,
}

impl IndexedSegment {
    /// Parameter in [0, 1] of the point on the segment closest to `p`
    pub fn project(&self, p: Point) -> f64 {
        let d = self.to - self.from;
        let len_2 = d.dot_product(d);
        if len_2 <= 0.0 {
            return 0.0;
        }
        ((p - self.from).dot_product(d) / len_2).clamp(0.0, 1.0)
    }
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.from.as_array(), self.to.as_array())
    }
}

impl PointDistance for IndexedSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let p = Point::new(point[0], point[1]);
        let closest = self.from.lerp(self.to, self.project(p));
        let d = p - closest;
        d.dot_product(d)
    }
}

pub fn node_index(graph: &Graph) -> RTree<IndexedNode> {
    let points = graph
        .nodes
        .values()
        .map(|n| IndexedNode {
            coords: n.point.as_array(),
            id: n.id,
        })
        .collect();
    RTree::bulk_load(points)
}

pub fn segment_index(graph: &Graph) -> RTree<IndexedSegment> {
    let segments = graph
        .edges
        .values()
        .flat_map(|e| {
            e.waypoints
                .windows(2)
                .enumerate()
                .map(move |(index, w)| IndexedSegment {
                    from: w[0],
                    to: w[1],
                    edge: e.id,
                    index,
                })
        })
        .collect();
    RTree::bulk_load(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_distance() {
        let seg = IndexedSegment {
            from: Point::new(0.0, 0.0),
            to: Point::new(10.0, 0.0),
            edge: EdgeId(0),
            index: 0,
        };
        assert_eq!(seg.distance_2(&[5.0, 3.0]), 9.0);
        assert_eq!(seg.distance_2(&[-4.0, 3.0]), 25.0);
        assert_eq!(seg.project(Point::new(2.5, -1.0)), 0.25);
    }

    #[test]
    fn test_nearest_segment() {
        let mut g = Graph::new();
        let a = g.add_node(Point::new(0.0, 0.0));
        let b = g.add_node(Point::new(10.0, 0.0));
        let c = g.add_node(Point::new(10.0, 10.0));
        g.add_edge(a, b, Vec::new()).unwrap();
        let e2 = g.add_edge(b, c, Vec::new()).unwrap();
        let tree = segment_index(&g);
        let nearest = tree.nearest_neighbor(&[11.0, 6.0]).unwrap();
        assert_eq!(nearest.edge, e2);
    }
}
