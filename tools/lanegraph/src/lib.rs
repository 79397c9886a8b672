//! Lane-level road network construction
//!
//! Turns a centerline road topology into a lane network: one polyline per
//! lane with left and right bounds, plus connector segments through every
//! intersection. See [`pipeline`] for the stage order.

pub mod annotate;
pub mod cluster;
pub mod config;
pub mod crop;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod interpolate;
pub mod lanes;
pub mod link;
pub mod merge;
pub mod offset;
pub mod pipeline;
pub mod report;
pub mod snapshot;
pub mod spatial;
pub mod union_find;
pub mod validate;

pub use annotate::{AnnotationSet, TrafficLight, TrafficSign};
pub use config::ConversionConfig;
pub use error::{ConvertError, Result};
pub use geometry::Point;
pub use graph::topology::{NetworkInput, SourceNode, SourceWay, Topology};
pub use graph::{Graph, Layer, SublayeredGraph};
pub use pipeline::{Conversion, Pipeline, PipelineReport, Stage};
pub use report::{LaneNetworkView, NetworkStats};
pub use validate::{check_invariants, InvariantReport};
