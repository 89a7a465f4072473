use floodwise_common::LatLng;
use geo::Point;

/// Default fixed-point scale: 1e7 units per degree (~1.1 cm at the equator)
pub const FXP_SCALE: f64 = 1e7;

/// Great-circle distance in meters
#[allow(deprecated)]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    use geo::HaversineDistance;

    let p1 = Point::new(lon1, lat1);
    let p2 = Point::new(lon2, lat2);
    p1.haversine_distance(&p2)
}

pub fn haversine(a: LatLng, b: LatLng) -> f64 {
    haversine_distance(a.lat, a.lng, b.lat, b.lng)
}

/// Convert degrees to a fixed-point integer at the given scale
#[inline]
pub fn to_fixed(degrees: f64, scale: f64) -> i64 {
    (degrees * scale).round() as i64
}

#[inline]
pub fn from_fixed(value: i64, scale: f64) -> f64 {
    value as f64 / scale
}
