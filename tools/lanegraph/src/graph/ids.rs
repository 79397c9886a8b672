//! Stable identifiers for graph entities

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(NodeId, "n");
define_id!(EdgeId, "e");
define_id!(SegmentId, "s");
define_id!(ClusterId, "c");

/// A lane is addressed by its edge and its index in that edge's lane order
/// (0 = leftmost looking along the edge direction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LaneId {
    pub edge: EdgeId,
    pub index: u16,
}

impl LaneId {
    pub fn new(edge: EdgeId, index: u16) -> Self {
        Self { edge, index }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.edge, self.index)
    }
}

/// Per-graph id allocation. Ids are never reused, so a deleted entity
/// can't be resurrected under its old identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdCounter {
    next_node: u64,
    next_edge: u64,
    next_segment: u64,
    next_cluster: u64,
}

impl IdCounter {
    pub fn node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn edge(&mut self) -> EdgeId {
        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        id
    }

    pub fn segment(&mut self) -> SegmentId {
        let id = SegmentId(self.next_segment);
        self.next_segment += 1;
        id
    }

    pub fn cluster(&mut self) -> ClusterId {
        let id = ClusterId(self.next_cluster);
        self.next_cluster += 1;
        id
    }

    /// Make sure future ids are allocated above an externally inserted one
    pub(crate) fn observe_node(&mut self, id: NodeId) {
        self.next_node = self.next_node.max(id.0 + 1);
    }

    pub(crate) fn observe_edge(&mut self, id: EdgeId) {
        self.next_edge = self.next_edge.max(id.0 + 1);
    }
}
