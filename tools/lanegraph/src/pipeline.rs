//! Conversion pipeline
//!
//! An explicit, ordered list of named stages. Each stage is a function of
//! (graph, configuration) mutating the graph in place, with a documented
//! precondition and postcondition. All stages except annotation run once on
//! the primary graph and once on the sublayer with the sublayer's own
//! thresholds. Any error aborts the whole conversion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, info_span};

use crate::annotate::{apply_annotations, AnnotationSet};
use crate::cluster::cluster_segments;
use crate::config::ConversionConfig;
use crate::crop::crop_graph;
use crate::error::{ConvertError, Result};
use crate::graph::topology::NetworkInput;
use crate::graph::{Graph, Layer, SublayeredGraph};
use crate::interpolate::interpolate_graph;
use crate::lanes::{create_lane_bounds, create_lane_link_segments, create_lanes};
use crate::link::{link_edges, link_lanes};
use crate::merge::merge_close_intersections;
use crate::offset::offset_graph;
use crate::report::NetworkStats;
use crate::validate::{
    check_invariants, correct_start_end_points, delete_invalid_lanes, InvariantReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageGroup {
    GraphConstruction,
    GeometricRefinement,
    Finalization,
}

impl fmt::Display for StageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageGroup::GraphConstruction => "graph construction",
            StageGroup::GeometricRefinement => "geometric refinement",
            StageGroup::Finalization => "lane finalization",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    MakeContiguous,
    MergeIntersections,
    LinkEdges,
    LinkLanes,
    Interpolate,
    Offset,
    Crop,
    ApplyAnnotations,
    CreateLanes,
    CreateLaneLinkSegments,
    ClusterSegments,
    CreateLaneBounds,
    DeleteInvalidLanes,
    CorrectStartEndPoints,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 14] = [
        Stage::MakeContiguous,
        Stage::MergeIntersections,
        Stage::LinkEdges,
        Stage::LinkLanes,
        Stage::Interpolate,
        Stage::Offset,
        Stage::Crop,
        Stage::ApplyAnnotations,
        Stage::CreateLanes,
        Stage::CreateLaneLinkSegments,
        Stage::ClusterSegments,
        Stage::CreateLaneBounds,
        Stage::DeleteInvalidLanes,
        Stage::CorrectStartEndPoints,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::MakeContiguous => "make_contiguous",
            Stage::MergeIntersections => "merge_intersections",
            Stage::LinkEdges => "link_edges",
            Stage::LinkLanes => "link_lanes",
            Stage::Interpolate => "interpolate",
            Stage::Offset => "offset",
            Stage::Crop => "crop",
            Stage::ApplyAnnotations => "apply_annotations",
            Stage::CreateLanes => "create_lanes",
            Stage::CreateLaneLinkSegments => "create_lane_link_segments",
            Stage::ClusterSegments => "cluster_segments",
            Stage::CreateLaneBounds => "create_lane_bounds",
            Stage::DeleteInvalidLanes => "delete_invalid_lanes",
            Stage::CorrectStartEndPoints => "correct_start_end_points",
        }
    }

    pub fn group(self) -> StageGroup {
        match self {
            Stage::MakeContiguous
            | Stage::MergeIntersections
            | Stage::LinkEdges
            | Stage::LinkLanes => StageGroup::GraphConstruction,
            Stage::Interpolate | Stage::Offset | Stage::Crop | Stage::ApplyAnnotations => {
                StageGroup::GeometricRefinement
            }
            _ => StageGroup::Finalization,
        }
    }

    pub fn precondition(self) -> &'static str {
        match self {
            Stage::MakeContiguous => "edges reference present nodes",
            Stage::MergeIntersections => "edges reference present nodes",
            Stage::LinkEdges => "node positions final; no merge-made loops",
            Stage::LinkLanes => "edge traversals linked",
            Stage::Interpolate => "waypoints start and end at their nodes",
            Stage::Offset => "centerlines densified to the working spacing",
            Stage::Crop => "every edge has one working path per lane",
            Stage::ApplyAnnotations => "edge centerlines final",
            Stage::CreateLanes => "lane paths cropped; lane links canonical",
            Stage::CreateLaneLinkSegments => "lanes oriented in travel direction",
            Stage::ClusterSegments => "segments exist for every realisable turn",
            Stage::CreateLaneBounds => "lane and segment centerlines final",
            Stage::DeleteInvalidLanes => "lanes and segments have bounds",
            Stage::CorrectStartEndPoints => "only valid lanes and segments remain",
        }
    }

    pub fn postcondition(self) -> &'static str {
        match self {
            Stage::MakeContiguous => "one undirected connected component (when enabled)",
            Stage::MergeIntersections => "no two nodes closer than the threshold",
            Stage::LinkEdges => "node in/out traversals and edge successors set",
            Stage::LinkLanes => "one canonical lane-link set per node",
            Stage::Interpolate => "segments no longer than the working spacing; endpoints unchanged",
            Stage::Offset => "distinct, loop-free working path per lane",
            Stage::Crop => "lane paths clear of intersections; short edges flagged",
            Stage::ApplyAnnotations => "signs bound to edges, lights to nodes",
            Stage::CreateLanes => "one lane per lane index with neighbour links",
            Stage::CreateLaneLinkSegments => "tangent-matched connector per turn",
            Stage::ClusterSegments => "each segment carries a cluster id",
            Stage::CreateLaneBounds => "output spacing; bounds with equal point counts",
            Stage::DeleteInvalidLanes => "no degenerate or self-intersecting lanes",
            Stage::CorrectStartEndPoints => "linked endpoints coincide exactly",
        }
    }

    /// Annotations describe the primary road network only
    pub fn runs_on_sublayer(self) -> bool {
        self != Stage::ApplyAnnotations
    }

    pub fn last() -> Stage {
        Stage::CorrectStartEndPoints
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace('-', "_");
        if let Some(stage) = Stage::ALL.iter().find(|st| st.name().eq_ignore_ascii_case(&wanted)) {
            return Ok(*stage);
        }
        let names: Vec<&str> = Stage::ALL.iter().map(|st| st.name()).collect();
        Err(ConvertError::UnknownStage {
            name: s.to_string(),
            suggestion: lanegraph_common::suggest_option(&wanted, &names),
        })
    }
}

/// What one stage did on one layer
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: Stage,
    pub layer: Layer,
    pub summary: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub stages: Vec<StageRecord>,
    pub stats: Vec<(Layer, NetworkStats)>,
    pub invariants: Vec<(Layer, InvariantReport)>,
}

pub struct Pipeline {
    config: ConversionConfig,
    annotations: AnnotationSet,
}

impl Pipeline {
    /// Rejects an invalid configuration before anything runs
    pub fn new(config: ConversionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            annotations: AnnotationSet::default(),
        })
    }

    pub fn with_annotations(mut self, annotations: AnnotationSet) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Run every stage and require the final invariants to hold
    pub fn run(&self, network: &mut SublayeredGraph) -> Result<PipelineReport> {
        self.run_until(network, Stage::last())
    }

    /// Run the stages up to and including `last`. Only a full run enforces
    /// boundary consistency; a prefix run reports the structural checks.
    pub fn run_until(&self, network: &mut SublayeredGraph, last: Stage) -> Result<PipelineReport> {
        network.for_each_layer(|_, graph| graph.verify_references())?;

        let mut report = PipelineReport::default();
        let started = Instant::now();
        for stage in Stage::ALL.into_iter().take_while(|s| *s <= last) {
            let span = info_span!("stage", name = stage.name());
            let _enter = span.enter();
            network.for_each_layer(|layer, graph| {
                if layer == Layer::Sublayer && !stage.runs_on_sublayer() {
                    return Ok(());
                }
                let _layer = info_span!("layer", %layer).entered();
                let t0 = Instant::now();
                let summary = self
                    .run_stage(stage, layer, graph)
                    .map_err(|e| e.in_stage(stage.name(), layer))?;
                report.stages.push(StageRecord {
                    stage,
                    layer,
                    summary,
                    elapsed: t0.elapsed(),
                });
                Ok(())
            })?;
        }

        let complete = last == Stage::last();
        for (layer, graph) in network.layers() {
            let invariants = check_invariants(graph, complete);
            if complete && !invariants.passed {
                return Err(ConvertError::Invariant(invariants.errors)
                    .in_stage("check_invariants", layer));
            }
            let stats = NetworkStats::of(graph);
            info!(%layer, %stats, "layer summary");
            report.stats.push((layer, stats));
            report.invariants.push((layer, invariants));
        }
        info!(
            stages = report.stages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(report)
    }

    fn run_stage(&self, stage: Stage, layer: Layer, graph: &mut Graph) -> Result<String> {
        let config = &self.config;
        let settings = config.layer(layer);
        let summary = match stage {
            Stage::MakeContiguous => {
                if config.make_contiguous {
                    let removed = graph.make_contiguous();
                    format!("removed {removed} edges outside the main component")
                } else {
                    "disabled".to_string()
                }
            }
            Stage::MergeIntersections => {
                let r = merge_close_intersections(graph, settings.intersection_distance);
                format!(
                    "{} clusters, {} nodes merged, {} loops removed",
                    r.clusters, r.merged_nodes, r.removed_loops
                )
            }
            Stage::LinkEdges => {
                let r = link_edges(graph)?;
                format!("{} traversals, {} dead ends", r.traversals, r.dead_ends)
            }
            Stage::LinkLanes => {
                let r = link_lanes(graph);
                format!("{} continuations, {} turns", r.continuations, r.turns)
            }
            Stage::Interpolate => {
                let n = interpolate_graph(graph, config.interpolation_distance_internal);
                format!("{n} waypoints")
            }
            Stage::Offset => {
                let r = offset_graph(graph, config.straightness_tolerance);
                format!(
                    "{} offset, {} copied, {} clamped lanes",
                    r.offset_edges, r.copied_edges, r.clamped_lanes
                )
            }
            Stage::Crop => {
                let r = crop_graph(graph, settings.intersection_distance, config.min_edge_length);
                if settings.delete_short_edges && !r.short_edges.is_empty() {
                    let doomed: BTreeSet<_> = r.short_edges.iter().copied().collect();
                    graph.delete_edges(&doomed);
                    format!("{} cropped, {} short edges deleted", r.cropped_edges, doomed.len())
                } else {
                    format!("{} cropped, {} short edges kept", r.cropped_edges, r.short_edges.len())
                }
            }
            Stage::ApplyAnnotations => {
                let r = apply_annotations(graph, &self.annotations, config.annotation_max_distance);
                format!(
                    "{} signs, {} lights, {} dropped",
                    r.signs_applied,
                    r.lights_applied,
                    r.signs_dropped + r.lights_dropped
                )
            }
            Stage::CreateLanes => format!("{} lanes", create_lanes(graph)),
            Stage::CreateLaneLinkSegments => {
                let r = create_lane_link_segments(graph, config.interpolation_distance_internal);
                format!("{} segments, {} skipped", r.created, r.skipped)
            }
            Stage::ClusterSegments => {
                let r = cluster_segments(
                    graph,
                    config.cluster_angle_tolerance,
                    config.cluster_curvature_tolerance,
                );
                format!("{} segments in {} clusters", r.segments, r.clusters)
            }
            Stage::CreateLaneBounds => {
                let n = create_lane_bounds(graph, config.interpolation_distance);
                format!("{n} bound points")
            }
            Stage::DeleteInvalidLanes => {
                if config.delete_invalid_lanes {
                    let r = delete_invalid_lanes(graph);
                    format!("{} lanes, {} segments deleted", r.deleted_lanes, r.deleted_segments)
                } else {
                    "disabled".to_string()
                }
            }
            Stage::CorrectStartEndPoints => {
                let r = correct_start_end_points(graph);
                format!("{} endpoint classes snapped", r.classes)
            }
        };
        Ok(summary)
    }
}

/// A network together with the configuration it was converted with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversion {
    pub network: SublayeredGraph,
    pub config: ConversionConfig,
}

impl Conversion {
    /// Build the initial graphs of both layers
    pub fn from_input(input: &NetworkInput, config: ConversionConfig) -> Result<Self> {
        config.validate()?;
        let graph = Graph::from_topology(&input.primary, &config)?;
        let sublayer = input
            .sublayer
            .as_ref()
            .map(|t| Graph::from_topology(t, &config))
            .transpose()?;
        Ok(Self {
            network: SublayeredGraph { graph, sublayer },
            config,
        })
    }

    pub fn run(&mut self, annotations: AnnotationSet) -> Result<PipelineReport> {
        self.run_until(annotations, Stage::last())
    }

    pub fn run_until(&mut self, annotations: AnnotationSet, last: Stage) -> Result<PipelineReport> {
        let pipeline = Pipeline::new(self.config.clone())?.with_annotations(annotations);
        pipeline.run_until(&mut self.network, last)
    }
}
