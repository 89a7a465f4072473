//! Error types and utilities for the floodwise toolkit
//!
//! Provides input validation errors and fuzzy matching for place names.

use strsim::{jaro_winkler, normalized_levenshtein};
use thiserror::Error;

/// Main error type for floodwise input handling
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Coordinate outside WGS84 bounds or not finite
    #[error("Invalid coordinate ({lat}, {lng}): {reason}")]
    InvalidCoordinate { lat: f64, lng: f64, reason: String },

    /// Network type string not recognized
    #[error("Unknown network type '{0}' (expected one of drive, walk, bike, all, all_private, none)")]
    UnknownNetworkType(String),

    /// Invalid configuration or parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type for floodwise-common operations
pub type Result<T> = std::result::Result<T, Error>;

/// Find the best fuzzy match for a place name among known candidates.
///
/// Scoring is 70% Jaro-Winkler plus 30% normalized Levenshtein on the
/// lowercased strings, with a bonus when the input matches one
/// comma-separated component of a candidate ("saintes" vs
/// "saintes, nouvelle-aquitaine"). Candidates scoring below 0.65 are ignored.
pub fn suggest_place<'a, I>(input: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let input_lower = input.trim().to_lowercase();
    if input_lower.is_empty() {
        return None;
    }

    let min_threshold = 0.65;
    let mut best_match = None;
    let mut best_score = 0.0f64;

    for candidate in candidates {
        let candidate_lower = candidate.to_lowercase();

        // exact match needs no suggestion
        if candidate_lower == input_lower {
            return None;
        }

        let jw_score = jaro_winkler(&input_lower, &candidate_lower);
        let lev_score = normalized_levenshtein(&input_lower, &candidate_lower);
        let mut score = (jw_score * 0.7) + (lev_score * 0.3);

        if candidate_lower.contains(',') {
            let part_bonus = candidate_lower
                .split(',')
                .map(str::trim)
                .filter(|part| part.len() >= 4)
                .map(|part| jaro_winkler(&input_lower, part))
                .filter(|similarity| *similarity > 0.85)
                .fold(0.0f64, f64::max);
            score += 0.12 * part_bonus;
        }

        if score >= min_threshold && score > best_score {
            best_score = score;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}
