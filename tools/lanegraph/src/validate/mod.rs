//! Validation and repair of the finished lane network

pub mod invariants;
pub mod repair;

pub use invariants::{check_invariants, InvariantReport, BOUNDARY_EPSILON};
pub use repair::{
    correct_start_end_points, delete_invalid_lanes, max_endpoint_gap, DeleteReport, SnapReport,
};
