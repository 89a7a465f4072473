//! Place names and road network types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Normalize a place name into a cache key.
///
/// Lowercases, trims and collapses inner whitespace, so `"  Saintes,  France"`
/// and `"saintes, france"` name the same place.
pub fn normalize_place(place: &str) -> String {
    place
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// File-system friendly slug for a place name: `"Saintes, Nouvelle-Aquitaine"`
/// becomes `"saintes-nouvelle-aquitaine"`.
pub fn place_slug(place: &str) -> String {
    let mut slug = String::with_capacity(place.len());
    let mut pending_dash = false;
    for c in normalize_place(place).chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Which part of the street network a graph covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    /// Drivable public streets
    #[default]
    Drive,
    /// Streets and paths pedestrians can use
    Walk,
    /// Streets and paths cyclists can use
    Bike,
    /// All non-private streets and paths
    All,
    /// All streets and paths including private ones
    AllPrivate,
    /// Every highway-tagged way, unfiltered
    None,
}

impl NetworkType {
    pub const ALL: [NetworkType; 6] = [
        NetworkType::Drive,
        NetworkType::Walk,
        NetworkType::Bike,
        NetworkType::All,
        NetworkType::AllPrivate,
        NetworkType::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Drive => "drive",
            NetworkType::Walk => "walk",
            NetworkType::Bike => "bike",
            NetworkType::All => "all",
            NetworkType::AllPrivate => "all_private",
            NetworkType::None => "none",
        }
    }

    /// Whether one-way tags restrict traversal for this network
    pub fn respects_oneway(&self) -> bool {
        matches!(self, NetworkType::Drive)
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        NetworkType::ALL
            .into_iter()
            .find(|nt| nt.as_str() == lower)
            .ok_or_else(|| Error::UnknownNetworkType(s.to_string()))
    }
}
