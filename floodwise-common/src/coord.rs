//! Geographic coordinates

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// WGS84 coordinate, serialized as `{"lat": .., "lng": ..}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check that the coordinate is finite and inside WGS84 bounds
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidCoordinate {
            lat: self.lat,
            lng: self.lng,
            reason: reason.to_string(),
        };
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(invalid("not a finite number"));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(invalid("latitude must be within [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(invalid("longitude must be within [-180, 180]"));
        }
        Ok(())
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

/// Parses `"lat,lng"` and validates the result
impl FromStr for LatLng {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| Error::InvalidInput(format!("coordinate '{s}' must be in format 'lat,lng'")))?;
        let number = |part: &str| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| Error::InvalidInput(format!("'{}' in coordinate '{s}' is not a number", part.trim())))
        };
        let coord = LatLng::new(number(lat)?, number(lng)?);
        coord.validate()?;
        Ok(coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(LatLng::new(45.74, -0.63).validate().is_ok());
        assert!(LatLng::new(91.0, 0.0).validate().is_err());
        assert!(LatLng::new(0.0, 181.0).validate().is_err());
        assert!(LatLng::new(f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_parse_lat_lng() {
        assert_eq!("45.74, -0.63".parse::<LatLng>(), Ok(LatLng::new(45.74, -0.63)));
        assert!(matches!("45.74".parse::<LatLng>(), Err(Error::InvalidInput(_))));
        assert!(matches!("north,-0.63".parse::<LatLng>(), Err(Error::InvalidInput(msg)) if msg.contains("north")));
        assert!(matches!("95,0".parse::<LatLng>(), Err(Error::InvalidCoordinate { .. })));
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(LatLng::new(48.8566, 2.3522)).unwrap();
        assert_eq!(json["lat"], 48.8566);
        assert_eq!(json["lng"], 2.3522);
    }
}
