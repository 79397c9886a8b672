//! Conversion configuration
//!
//! One explicit value threaded into every stage. Option names follow the
//! historical SCREAMING_SNAKE_CASE keys, so a TOML file reads e.g.
//!
//! ```toml
//! INTERSECTION_DISTANCE = 8.0
//! DELETE_SHORT_EDGES = true
//!
//! [LANE_WIDTHS]
//! motorway = 3.75
//! ```

use lanegraph_common::Error as ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::graph::Layer;

/// Every option name accepted in a configuration file
pub const KNOWN_OPTIONS: &[&str] = &[
    "MAKE_CONTIGUOUS",
    "INTERSECTION_DISTANCE",
    "INTERSECTION_DISTANCE_SUBLAYER",
    "DELETE_SHORT_EDGES",
    "DELETE_SHORT_EDGES_SUBLAYER",
    "DELETE_INVALID_LANES",
    "INTERPOLATION_DISTANCE",
    "INTERPOLATION_DISTANCE_INTERNAL",
    "LANE_WIDTH",
    "LANE_WIDTHS",
    "STRAIGHTNESS_TOLERANCE",
    "MIN_EDGE_LENGTH",
    "ANNOTATION_MAX_DISTANCE",
    "CLUSTER_ANGLE_TOLERANCE",
    "CLUSTER_CURVATURE_TOLERANCE",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct ConversionConfig {
    /// Drop every component not reachable from the reference node
    pub make_contiguous: bool,
    /// Merge and crop threshold for the primary layer (m)
    pub intersection_distance: f64,
    /// Merge and crop threshold for the sublayer (m)
    pub intersection_distance_sublayer: f64,
    /// Delete the cropper's short-edge candidates on the primary layer
    pub delete_short_edges: bool,
    /// Same for the sublayer
    pub delete_short_edges_sublayer: bool,
    pub delete_invalid_lanes: bool,
    /// Output spacing of final lane and segment geometry (m)
    pub interpolation_distance: f64,
    /// Working spacing used before the final resampling (m)
    pub interpolation_distance_internal: f64,
    /// Default lane width (m)
    pub lane_width: f64,
    /// Lane width per road class, overriding `lane_width`
    pub lane_widths: BTreeMap<String, f64>,
    /// Chord deviation above which a single-lane edge counts as curved (m)
    pub straightness_tolerance: f64,
    /// Shortest edge that survives cropping without being flagged (m)
    pub min_edge_length: f64,
    /// Annotations further than this from any edge or node are dropped (m)
    pub annotation_max_distance: f64,
    /// Entry-axis tolerance for segment clustering (degrees)
    pub cluster_angle_tolerance: f64,
    /// Mean-curvature tolerance for segment clustering (1/m)
    pub cluster_curvature_tolerance: f64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            make_contiguous: false,
            intersection_distance: 10.0,
            intersection_distance_sublayer: 5.0,
            delete_short_edges: false,
            delete_short_edges_sublayer: true,
            delete_invalid_lanes: true,
            interpolation_distance: 0.5,
            interpolation_distance_internal: 0.25,
            lane_width: 3.5,
            lane_widths: BTreeMap::new(),
            straightness_tolerance: 0.2,
            min_edge_length: 1.0,
            annotation_max_distance: 10.0,
            cluster_angle_tolerance: 15.0,
            cluster_curvature_tolerance: 0.02,
        }
    }
}

/// Thresholds resolved for one layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSettings {
    pub intersection_distance: f64,
    pub delete_short_edges: bool,
}

impl ConversionConfig {
    /// Parse TOML, rejecting unknown keys with a suggestion
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(input)?;
        if let Some(key) = table.keys().find(|k| !KNOWN_OPTIONS.contains(&k.as_str())) {
            return Err(ConfigError::unknown_option(key, KNOWN_OPTIONS));
        }
        let config: ConversionConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Reject non-positive thresholds and spacings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("INTERSECTION_DISTANCE", self.intersection_distance),
            ("INTERSECTION_DISTANCE_SUBLAYER", self.intersection_distance_sublayer),
            ("INTERPOLATION_DISTANCE", self.interpolation_distance),
            ("INTERPOLATION_DISTANCE_INTERNAL", self.interpolation_distance_internal),
            ("LANE_WIDTH", self.lane_width),
            ("MIN_EDGE_LENGTH", self.min_edge_length),
            ("ANNOTATION_MAX_DISTANCE", self.annotation_max_distance),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid_value(
                    key,
                    format!("must be a positive number, got {value}"),
                ));
            }
        }

        let non_negative = [
            ("STRAIGHTNESS_TOLERANCE", self.straightness_tolerance),
            ("CLUSTER_ANGLE_TOLERANCE", self.cluster_angle_tolerance),
            ("CLUSTER_CURVATURE_TOLERANCE", self.cluster_curvature_tolerance),
        ];
        for (key, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid_value(
                    key,
                    format!("must be zero or positive, got {value}"),
                ));
            }
        }

        if let Some((class, width)) = self
            .lane_widths
            .iter()
            .find(|(_, w)| !(w.is_finite() && **w > 0.0))
        {
            return Err(ConfigError::invalid_value(
                "LANE_WIDTHS",
                format!("width for '{class}' must be positive, got {width}"),
            ));
        }
        Ok(())
    }

    pub fn layer(&self, layer: Layer) -> LayerSettings {
        match layer {
            Layer::Primary => LayerSettings {
                intersection_distance: self.intersection_distance,
                delete_short_edges: self.delete_short_edges,
            },
            Layer::Sublayer => LayerSettings {
                intersection_distance: self.intersection_distance_sublayer,
                delete_short_edges: self.delete_short_edges_sublayer,
            },
        }
    }

    pub fn lane_width_for(&self, road_class: &str) -> f64 {
        self.lane_widths
            .get(road_class)
            .copied()
            .unwrap_or(self.lane_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ConversionConfig::default();
        config.validate().unwrap();
        assert!(!config.delete_short_edges);
        assert!(config.delete_short_edges_sublayer);
        assert!(config.interpolation_distance_internal < config.interpolation_distance);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = ConversionConfig::from_toml_str(
            r#"
            INTERSECTION_DISTANCE = 8.0
            MAKE_CONTIGUOUS = true

            [LANE_WIDTHS]
            motorway = 3.75
            "#,
        )
        .unwrap();
        assert_eq!(config.intersection_distance, 8.0);
        assert!(config.make_contiguous);
        assert_eq!(config.interpolation_distance, 0.5);
        assert_eq!(config.lane_width_for("motorway"), 3.75);
        assert_eq!(config.lane_width_for("residential"), 3.5);
    }

    #[test]
    fn test_unknown_key_suggests() {
        let err = ConversionConfig::from_toml_str("INTERSECTON_DISTANCE = 3.0").unwrap_err();
        match err {
            ConfigError::UnknownOption { key, suggestion } => {
                assert_eq!(key, "INTERSECTON_DISTANCE");
                assert_eq!(suggestion.as_deref(), Some("INTERSECTION_DISTANCE"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_non_positive() {
        let err = ConversionConfig::from_toml_str("INTERPOLATION_DISTANCE = 0.0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "INTERPOLATION_DISTANCE"));

        let err = ConversionConfig::from_toml_str("INTERSECTION_DISTANCE_SUBLAYER = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_type_mismatch_is_parse_error() {
        let err = ConversionConfig::from_toml_str("MAKE_CONTIGUOUS = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_layer_settings() {
        let config = ConversionConfig::default();
        assert_eq!(config.layer(Layer::Primary).intersection_distance, 10.0);
        assert_eq!(config.layer(Layer::Sublayer).intersection_distance, 5.0);
        assert!(config.layer(Layer::Sublayer).delete_short_edges);
    }
}
