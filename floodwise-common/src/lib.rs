//! Common utilities for the floodwise toolkit

pub mod coord;
pub mod error;
pub mod place;

pub use coord::LatLng;
pub use error::{suggest_place, Error, Result};
pub use place::{normalize_place, place_slug, NetworkType};
