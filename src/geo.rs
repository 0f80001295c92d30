//! Pure geodesy helpers: great-circle distance and flat-earth offsets.

use serde::{Deserialize, Serialize};

/// Mean Earth radius, used for great-circle distance.
const EARTH_RADIUS_MEAN_M: f64 = 6_371_000.0;
/// WGS-84 equatorial radius, used for the small-angle offset projection.
const EARTH_RADIUS_EQUATORIAL_M: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl Point {
    pub fn new(latitude_deg: f64, longitude_deg: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
        }
    }
}

/// Haversine great-circle distance between two points, in meters.
pub fn distance_m(a: Point, b: Point) -> f64 {
    let phi1 = a.latitude_deg.to_radians();
    let phi2 = b.latitude_deg.to_radians();
    let delta_phi = (b.latitude_deg - a.latitude_deg).to_radians();
    let delta_lambda = (b.longitude_deg - a.longitude_deg).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_MEAN_M * c
}

/// Projects a forward/right displacement (relative to `heading_deg`) from
/// `origin` into a new point, using a flat-earth small-angle approximation.
/// Valid for offsets up to a few kilometers.
pub fn offset(origin: Point, heading_deg: f64, forward_m: f64, right_m: f64) -> Point {
    let heading = heading_deg.to_radians();
    let lat_rad = origin.latitude_deg.to_radians();

    let north_m = forward_m * heading.cos() - right_m * heading.sin();
    let east_m = forward_m * heading.sin() + right_m * heading.cos();

    let dlat = north_m / EARTH_RADIUS_EQUATORIAL_M;
    let dlon = east_m / (EARTH_RADIUS_EQUATORIAL_M * lat_rad.cos());

    Point {
        latitude_deg: origin.latitude_deg + dlat.to_degrees(),
        longitude_deg: origin.longitude_deg + dlon.to_degrees(),
    }
}
