//! Distance unit conversions and spherical geometry helpers
//!
//! Points are `geo::Point<f64>` with x = longitude and y = latitude, both in degrees,
//! matching the `[longitude, latitude]` order tours are stored in.

use crate::ValidationError;
use geo::Point;
use std::fmt;
use std::str::FromStr;

/// Earth radius in miles used to turn a radius into an angular radius
pub const EARTH_RADIUS_MILES: f64 = 3963.2;

/// Earth radius in kilometers used to turn a radius into an angular radius
pub const EARTH_RADIUS_KM: f64 = 6378.1;

/// Earth radius in meters for great-circle distances.
/// Same radius as the kilometer divisor so that radius search and ranking agree.
pub const EARTH_RADIUS_METERS: f64 = EARTH_RADIUS_KM * 1000.0;

/// Meters to miles
pub const METERS_TO_MILES: f64 = 0.000621371;

/// Meters to kilometers
pub const METERS_TO_KILOMETERS: f64 = 0.001;

/// Supported distance units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DistanceUnit {
    #[serde(rename = "mi")]
    Miles,
    #[serde(rename = "km")]
    Kilometers,
}

impl DistanceUnit {
    /// Short name as used in request paths (`mi` / `km`)
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceUnit::Miles => "mi",
            DistanceUnit::Kilometers => "km",
        }
    }

    /// Earth radius expressed in this unit
    #[inline]
    pub fn earth_radius(self) -> f64 {
        match self {
            DistanceUnit::Miles => EARTH_RADIUS_MILES,
            DistanceUnit::Kilometers => EARTH_RADIUS_KM,
        }
    }

    /// Factor converting meters into this unit
    #[inline]
    pub fn meters_multiplier(self) -> f64 {
        match self {
            DistanceUnit::Miles => METERS_TO_MILES,
            DistanceUnit::Kilometers => METERS_TO_KILOMETERS,
        }
    }
}

impl FromStr for DistanceUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mi" => Ok(DistanceUnit::Miles),
            "km" => Ok(DistanceUnit::Kilometers),
            other => Err(ValidationError::UnsupportedUnit(other.to_string())),
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a linear radius into the angular radius (radians) of a spherical cap
#[inline]
pub fn radius_to_angular_radius(distance: f64, unit: DistanceUnit) -> f64 {
    distance / unit.earth_radius()
}

/// Multiplier converting a distance in meters into `unit`
#[inline]
pub fn distance_unit_multiplier(unit: DistanceUnit) -> f64 {
    unit.meters_multiplier()
}

/// Angular radius for a unit given as text; unknown units are rejected
pub fn angular_radius_for(distance: f64, unit: &str) -> Result<f64, ValidationError> {
    Ok(radius_to_angular_radius(distance, unit.parse()?))
}

/// Meters multiplier for a unit given as text; unknown units are rejected
pub fn unit_multiplier_for(unit: &str) -> Result<f64, ValidationError> {
    Ok(distance_unit_multiplier(unit.parse()?))
}

/// Great-circle angle in radians between two points (haversine formula)
#[inline]
pub fn central_angle(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let delta_lat = (b.y() - a.y()).to_radians();
    let delta_lon = (b.x() - a.x()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);

    // Rounding can push h slightly outside [0, 1] for antipodal points
    2.0 * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Great-circle distance between two points in meters
#[inline]
pub fn great_circle_distance_meters(a: Point<f64>, b: Point<f64>) -> f64 {
    central_angle(a, b) * EARTH_RADIUS_METERS
}

/// Check whether `point` lies inside the spherical cap around `center`
#[inline]
pub fn within_spherical_cap(point: Point<f64>, center: Point<f64>, angular_radius: f64) -> bool {
    central_angle(point, center) <= angular_radius
}

/// Check that a point has finite coordinates within longitude/latitude bounds
#[inline]
pub fn is_valid_coordinate(point: &Point<f64>) -> bool {
    let (lon, lat) = (point.x(), point.y());
    lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat)
}
