//! Common utilities for the lanegraph toolkit

pub mod error;

pub use error::{suggest_option, Error, Result};

#[cfg(test)]
mod tests {
    use crate::error::suggest_option;

    #[test]
    fn suggest_option_returns_expected_key() {
        let known = ["INTERSECTION_DISTANCE", "INTERPOLATION_DISTANCE"];
        assert_eq!(
            suggest_option("INTERSECTON_DISTANCE", &known),
            Some("INTERSECTION_DISTANCE".to_string())
        );
    }
}
