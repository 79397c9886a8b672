//! Error types and utilities for the lanegraph toolkit
//!
//! Configuration errors plus fuzzy matching of misspelled option names.

use strsim::{jaro_winkler, normalized_levenshtein};
use thiserror::Error;

/// Result alias for configuration handling
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum Error {
    /// Option name not recognized
    #[error("Unknown option '{key}'{}", did_you_mean(.suggestion))]
    UnknownOption {
        key: String,
        suggestion: Option<String>,
    },

    /// Option present but its value is unusable
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// TOML syntax or type mismatch
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::UnknownOption`] carrying the closest known option, if any
    pub fn unknown_option(key: &str, known: &[&str]) -> Self {
        Error::UnknownOption {
            key: key.to_string(),
            suggestion: suggest_option(key, known),
        }
    }

    pub fn invalid_value(key: &str, reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean '{s}'?)"),
        None => String::new(),
    }
}

/// Minimum combined score for a candidate to be suggested.
/// Option names are long and share the `_DISTANCE` tails, so the bar sits
/// above what a shared suffix alone can reach.
const MIN_THRESHOLD: f64 = 0.72;

/// Find the best fuzzy match using character similarity plus token bonuses
///
/// Jaro-Winkler 70% + Normalized Levenshtein 30%, then:
/// - Prefix bonus: up to +15% for a strong match on the first 6 chars
/// - Token bonus: up to +10% per `_`-separated part matched almost exactly
/// - Short-candidate penalty: -10% when a long input meets a one-token name
fn find_best_fuzzy_match(input: &str, candidates: &[&str]) -> Option<String> {
    let input_lower = input.to_lowercase();
    let input_tokens: Vec<&str> = input_lower.split('_').filter(|t| !t.is_empty()).collect();

    let mut best_match = None;
    let mut best_score = 0.0f64;

    for candidate in candidates {
        let candidate_lower = candidate.to_lowercase();

        let jw_score = jaro_winkler(&input_lower, &candidate_lower);
        let lev_score = normalized_levenshtein(&input_lower, &candidate_lower);
        let combined_score = (jw_score * 0.7) + (lev_score * 0.3);

        let mut bonus = 0.0;

        let prefix_len = input_lower.chars().count().min(6);
        if prefix_len >= 4 {
            let input_prefix: String = input_lower.chars().take(prefix_len).collect();
            let candidate_prefix: String = candidate_lower.chars().take(prefix_len).collect();
            let prefix_similarity = normalized_levenshtein(&input_prefix, &candidate_prefix);
            if prefix_similarity > 0.7 {
                bonus += 0.15 * prefix_similarity;
            }
        }

        let candidate_tokens: Vec<&str> = candidate_lower.split('_').collect();
        for token in &input_tokens {
            if token.len() < 4 {
                continue;
            }
            let best_part = candidate_tokens
                .iter()
                .map(|part| jaro_winkler(token, part))
                .fold(0.0f64, f64::max);
            if best_part > 0.9 {
                bonus += 0.1 * best_part / input_tokens.len() as f64;
            }
        }

        if input_tokens.len() >= 2 && candidate_tokens.len() == 1 {
            bonus -= 0.1;
        }

        let final_score = combined_score + bonus;
        if final_score >= MIN_THRESHOLD && final_score > best_score {
            best_score = final_score;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}

/// Suggest the known option closest to a misspelled one
///
/// Returns `None` when the input already names an option exactly. A match
/// that differs only by case is returned with the canonical casing.
pub fn suggest_option(key: &str, known: &[&str]) -> Option<String> {
    if known.contains(&key) {
        return None;
    }
    if let Some(exact) = known.iter().find(|k| k.eq_ignore_ascii_case(key)) {
        return Some(exact.to_string());
    }
    find_best_fuzzy_match(key, known)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &[
        "MAKE_CONTIGUOUS",
        "INTERSECTION_DISTANCE",
        "INTERSECTION_DISTANCE_SUBLAYER",
        "DELETE_SHORT_EDGES",
        "DELETE_INVALID_LANES",
        "INTERPOLATION_DISTANCE",
        "INTERPOLATION_DISTANCE_INTERNAL",
        "LANE_WIDTH",
    ];

    #[test]
    fn test_suggest_option_typos() {
        assert_eq!(
            suggest_option("MAKE_CONTIGOUS", KNOWN),
            Some("MAKE_CONTIGUOUS".to_string())
        );
        assert_eq!(
            suggest_option("DELETE_INVALID_LANE", KNOWN),
            Some("DELETE_INVALID_LANES".to_string())
        );
        assert_eq!(
            suggest_option("LANE_WIDHT", KNOWN),
            Some("LANE_WIDTH".to_string())
        );
    }

    #[test]
    fn test_suggest_option_case_only() {
        assert_eq!(
            suggest_option("lane_width", KNOWN),
            Some("LANE_WIDTH".to_string())
        );
    }

    #[test]
    fn test_suggest_option_exact_and_unrelated() {
        assert_eq!(suggest_option("LANE_WIDTH", KNOWN), None);
        assert_eq!(suggest_option("zzqx", KNOWN), None);
    }

    #[test]
    fn test_unknown_option_display() {
        let err = Error::unknown_option("LANE_WIDHT", KNOWN);
        assert_eq!(
            err.to_string(),
            "Unknown option 'LANE_WIDHT' (did you mean 'LANE_WIDTH'?)"
        );

        let err = Error::UnknownOption {
            key: "zzqx".to_string(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "Unknown option 'zzqx'");
    }
}
