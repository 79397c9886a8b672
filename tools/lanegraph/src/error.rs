//! Conversion errors

use thiserror::Error;

use crate::graph::{EdgeId, Layer, NodeId};

pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// Edge endpoint names a node that is not in the graph
    #[error("edge {edge} references unknown node {node}")]
    UnknownNode { edge: EdgeId, node: NodeId },

    /// Source way references a node missing from the topology
    #[error("way {way} references unknown source node {node}")]
    UnknownNodeRef { way: i64, node: i64 },

    #[error("way {way} has fewer than two distinct nodes")]
    DegenerateWay { way: i64 },

    #[error(transparent)]
    Config(#[from] lanegraph_common::Error),

    #[error("unknown stage '{name}'{}", .suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    UnknownStage {
        name: String,
        suggestion: Option<String>,
    },

    /// An error raised inside a pipeline stage, tagged with where it happened
    #[error("stage '{stage}' failed on {layer} layer: {source}")]
    Stage {
        stage: &'static str,
        layer: Layer,
        #[source]
        source: Box<ConvertError>,
    },

    #[error("network invariants violated: {}", .0.join("; "))]
    Invariant(Vec<String>),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConvertError {
    pub fn in_stage(self, stage: &'static str, layer: Layer) -> Self {
        ConvertError::Stage {
            stage,
            layer,
            source: Box::new(self),
        }
    }
}
