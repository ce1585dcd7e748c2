//! Validated query parameters
//!
//! Request values arrive as text. Everything here parses them explicitly and fails with a
//! [`ValidationError`] instead of falling back to a default.

use crate::utils::{self, DistanceUnit};
use crate::ValidationError;
use chrono::{DateTime, NaiveDate, Utc};
use geo::Point;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Parse a real number, rejecting NaN and infinities
fn parse_number(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    let invalid = || ValidationError::InvalidNumber {
        field,
        value: raw.to_string(),
    };
    let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if value.is_finite() { Ok(value) } else { Err(invalid()) }
}

/// Treat absent and blank values alike
fn required<'a>(field: &'static str, raw: Option<&'a str>) -> Result<&'a str, ValidationError> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// Center of a radius search or distance ranking
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CenterPoint {
    longitude: f64,
    latitude: f64,
}

impl CenterPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, ValidationError> {
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::OutOfRange {
                field: "longitude",
                value: longitude,
            });
        }
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::OutOfRange {
                field: "latitude",
                value: latitude,
            });
        }
        Ok(Self { longitude, latitude })
    }

    /// Parse separately supplied latitude and longitude; both are required
    pub fn parse(latitude: Option<&str>, longitude: Option<&str>) -> Result<Self, ValidationError> {
        let latitude = parse_number("latitude", required("latitude", latitude)?)?;
        let longitude = parse_number("longitude", required("longitude", longitude)?)?;
        Self::new(longitude, latitude)
    }

    /// Parse the `lat,lng` form used in request paths
    pub fn from_latlng(latlng: &str) -> Result<Self, ValidationError> {
        let mut parts = latlng.splitn(2, ',');
        Self::parse(parts.next(), parts.next())
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[inline]
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

impl FromStr for CenterPoint {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_latlng(s)
    }
}

/// Parameters of a radius search
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadiusQuery {
    pub center: CenterPoint,
    /// Radius in `unit`, always positive
    pub radius: f64,
    pub unit: DistanceUnit,
}

impl RadiusQuery {
    pub fn new(center: CenterPoint, radius: f64, unit: DistanceUnit) -> Result<Self, ValidationError> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ValidationError::NonPositiveRadius(radius));
        }
        Ok(Self { center, radius, unit })
    }

    /// Parse the `distance`, `lat,lng` and `unit` request values
    pub fn parse(distance: &str, latlng: &str, unit: &str) -> Result<Self, ValidationError> {
        let center = CenterPoint::from_latlng(latlng)?;
        let radius = parse_number("distance", required("distance", Some(distance))?)?;
        Self::new(center, radius, unit.parse()?)
    }

    /// Radius as an angle in radians
    #[inline]
    pub fn angular_radius(&self) -> f64 {
        utils::radius_to_angular_radius(self.radius, self.unit)
    }
}

/// Parameters of a distance ranking
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceQuery {
    pub center: CenterPoint,
    pub unit: DistanceUnit,
}

impl DistanceQuery {
    pub fn new(center: CenterPoint, unit: DistanceUnit) -> Self {
        Self { center, unit }
    }

    pub fn parse(latlng: &str, unit: &str) -> Result<Self, ValidationError> {
        let center = CenterPoint::from_latlng(latlng)?;
        Ok(Self::new(center, unit.parse()?))
    }

    /// Factor applied to distances in meters
    #[inline]
    pub fn multiplier(&self) -> f64 {
        utils::distance_unit_multiplier(self.unit)
    }
}

/// A four-digit calendar year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Year(i32);

impl Year {
    pub fn new(year: i32) -> Result<Self, ValidationError> {
        if (1000..=9999).contains(&year) {
            Ok(Self(year))
        } else {
            Err(ValidationError::InvalidYear(year.to_string()))
        }
    }

    /// Parse exactly four ASCII digits, ignoring surrounding whitespace
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidYear(raw.to_string());
        let digits = raw.trim();
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = digits.parse().map_err(|_| invalid())?;
        Self::new(year)
    }

    #[inline]
    pub fn value(self) -> i32 {
        self.0
    }

    /// First and last instant of the year in UTC, both inclusive
    pub fn bounds(self) -> Result<(DateTime<Utc>, DateTime<Utc>), ValidationError> {
        let invalid = || ValidationError::InvalidYear(self.0.to_string());
        let start = NaiveDate::from_ymd_opt(self.0, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(invalid)?;
        let end = NaiveDate::from_ymd_opt(self.0, 12, 31)
            .and_then(|date| date.and_hms_milli_opt(23, 59, 59, 999))
            .ok_or_else(invalid)?;
        Ok((start.and_utc(), end.and_utc()))
    }
}

impl FromStr for Year {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_center_from_latlng() {
        let center = CenterPoint::from_latlng("34.111745,-118.113491").unwrap();
        assert_eq!(center.latitude(), 34.111745);
        assert_eq!(center.longitude(), -118.113491);
        assert_eq!(center.point(), Point::new(-118.113491, 34.111745));

        let spaced: CenterPoint = " 1.5 , 2.5 ".parse().unwrap();
        assert_eq!((spaced.latitude(), spaced.longitude()), (1.5, 2.5));
    }

    #[test]
    fn test_center_missing_parts() {
        assert_eq!(
            CenterPoint::from_latlng("34.1"),
            Err(ValidationError::MissingField("longitude"))
        );
        assert_eq!(
            CenterPoint::from_latlng(",-118.1"),
            Err(ValidationError::MissingField("latitude"))
        );
        assert_eq!(
            CenterPoint::parse(Some("1"), None),
            Err(ValidationError::MissingField("longitude"))
        );
    }

    #[test]
    fn test_center_rejects_bad_numbers() {
        assert!(matches!(
            CenterPoint::from_latlng("abc,10"),
            Err(ValidationError::InvalidNumber { field: "latitude", .. })
        ));
        assert!(matches!(
            CenterPoint::from_latlng("10,NaN"),
            Err(ValidationError::InvalidNumber { field: "longitude", .. })
        ));
        assert!(matches!(
            CenterPoint::from_latlng("91,10"),
            Err(ValidationError::OutOfRange { field: "latitude", .. })
        ));
        assert!(matches!(
            CenterPoint::new(180.5, 0.0),
            Err(ValidationError::OutOfRange { field: "longitude", .. })
        ));
    }

    #[test]
    fn test_radius_query() {
        let query = RadiusQuery::parse("400", "34.1,-118.1", "mi").unwrap();
        assert_eq!(query.unit, DistanceUnit::Miles);
        assert!((query.angular_radius() - 400.0 / 3963.2).abs() < 1e-12);

        assert_eq!(
            RadiusQuery::parse("0", "34.1,-118.1", "mi"),
            Err(ValidationError::NonPositiveRadius(0.0))
        );
        assert_eq!(
            RadiusQuery::parse("-5", "34.1,-118.1", "km"),
            Err(ValidationError::NonPositiveRadius(-5.0))
        );
        assert_eq!(
            RadiusQuery::parse("", "34.1,-118.1", "km"),
            Err(ValidationError::MissingField("distance"))
        );
        assert_eq!(
            RadiusQuery::parse("10", "34.1,-118.1", "m"),
            Err(ValidationError::UnsupportedUnit("m".to_string()))
        );
    }

    #[test]
    fn test_distance_query() {
        let query = DistanceQuery::parse("0,0", "km").unwrap();
        assert_eq!(query.multiplier(), 0.001);
        assert!(DistanceQuery::parse("0,0", "yards").is_err());
    }

    #[test]
    fn test_year_parse() {
        assert_eq!(Year::parse("2021").unwrap().value(), 2021);
        assert_eq!(Year::parse(" 2021\n").unwrap().value(), 2021);
        for bad in ["", "21", "20210", "+202", "２０２１", "0999", "abcd"] {
            assert!(Year::parse(bad).is_err(), "{bad:?} accepted");
        }
        assert!(Year::new(10_000).is_err());
    }

    #[test]
    fn test_year_bounds() {
        let (start, end) = Year::parse("2024").unwrap().bounds().unwrap();
        assert_eq!((start.year(), start.month(), start.day(), start.hour()), (2024, 1, 1, 0));
        assert_eq!((end.year(), end.month(), end.day()), (2024, 12, 31));
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));
        assert_eq!(end.timestamp_subsec_millis(), 999);
    }
}
