//! Tour records and their conversion into pipeline documents
//!
//! Tours are loaded from JSON in the shape the booking service stores them: camelCase fields,
//! `_id` as identifier and GeoJSON-style locations with `[longitude, latitude]` coordinates.

use crate::{Document, StoreError, ValidationError, Value, utils};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use geo::Point;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Default ratings average of a tour without reviews
const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

/// Tour difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Difficult => "difficult",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "difficult" => Ok(Difficulty::Difficult),
            other => Err(ValidationError::UnknownDifficulty(other.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GeoJSON geometry type; only points are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeometryKind {
    #[default]
    Point,
}

/// A geographic point with optional description
///
/// Used for the start location and for the waypoints of a tour (which also carry a day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type", default)]
    pub kind: GeometryKind,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Day of the tour on which this waypoint is visited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

impl Location {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            kind: GeometryKind::Point,
            coordinates: [longitude, latitude],
            address: None,
            description: None,
            day: None,
        }
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.coordinates[0]
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.coordinates[1]
    }

    #[inline]
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude(), self.latitude())
    }

    fn to_document(&self) -> Document {
        let mut doc = Document::with_capacity(5)
            .with("type", "Point")
            .with("coordinates", vec![self.longitude(), self.latitude()]);
        if let Some(address) = &self.address {
            doc.insert("address", address.as_str());
        }
        if let Some(description) = &self.description {
            doc.insert("description", description.as_str());
        }
        if let Some(day) = self.day {
            doc.insert("day", day);
        }
        doc
    }
}

/// A review attached to a tour, owned by the review subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub review: String,
    pub rating: f64,
    /// Identifier of the reviewing user
    pub user: String,
}

impl Review {
    fn to_document(&self) -> Document {
        Document::with_capacity(4)
            .with("_id", self.id.as_str())
            .with("review", self.review.as_str())
            .with("rating", self.rating)
            .with("user", self.user.as_str())
    }
}

/// A bookable tour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Derived from the name when absent
    #[serde(default)]
    pub slug: String,
    /// Duration in days
    pub duration: u32,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    #[serde(default = "default_ratings_average")]
    pub ratings_average: f64,
    #[serde(default)]
    pub ratings_quantity: u64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_cover: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default, deserialize_with = "deserialize_start_dates")]
    pub start_dates: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviews: Vec<Review>,
}

fn default_ratings_average() -> f64 {
    DEFAULT_RATINGS_AVERAGE
}

impl Tour {
    /// Create a tour with the required fields; everything else takes its default
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        difficulty: Difficulty,
        price: f64,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            slug: slugify(&name),
            name,
            duration: 1,
            max_group_size: 1,
            difficulty,
            ratings_average: DEFAULT_RATINGS_AVERAGE,
            ratings_quantity: 0,
            price,
            price_discount: None,
            summary: String::new(),
            description: String::new(),
            image_cover: None,
            images: Vec::new(),
            start_location: None,
            locations: Vec::new(),
            start_dates: Vec::new(),
            secret_tour: false,
            reviews: Vec::new(),
        }
    }

    /// Normalize and validate a tour before it enters a store snapshot
    ///
    /// Fills a missing slug from the name and rejects records that break the model's
    /// invariants.
    pub fn prepare(mut self) -> Result<Arc<Self>, StoreError> {
        if self.slug.trim().is_empty() {
            self.slug = slugify(&self.name);
        }
        self.validate()?;
        Ok(Arc::new(self))
    }

    /// Check the record against the model's invariants
    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |reason: String| StoreError::InvalidRecord {
            id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("missing _id".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("a tour must have a name".to_string()));
        }
        if !(1.0..=5.0).contains(&self.ratings_average) {
            return Err(invalid(format!(
                "ratingsAverage must be within 1.0 and 5.0, got {}",
                self.ratings_average
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(invalid(format!("price must be non-negative, got {}", self.price)));
        }
        if self.duration == 0 {
            return Err(invalid("duration must be positive".to_string()));
        }
        if self.max_group_size == 0 {
            return Err(invalid("maxGroupSize must be positive".to_string()));
        }
        if let Some(review) = self
            .reviews
            .iter()
            .find(|review| !(1.0..=5.0).contains(&review.rating))
        {
            return Err(invalid(format!(
                "review {} rating must be within 1 and 5, got {}",
                review.id, review.rating
            )));
        }
        if let Some(location) = &self.start_location
            && !utils::is_valid_coordinate(&location.point())
        {
            return Err(invalid(format!(
                "startLocation coordinates out of range: {:?}",
                location.coordinates
            )));
        }
        Ok(())
    }

    /// Start location as a point, if the tour has one
    #[inline]
    pub fn start_point(&self) -> Option<Point<f64>> {
        self.start_location.as_ref().map(Location::point)
    }

    /// Build the document representation pipelines operate on
    pub fn to_document(&self) -> Document {
        #[cfg(feature = "profiling")]
        profiling::scope!("tour::to_document");

        let mut doc = Document::with_capacity(20)
            .with("_id", self.id.as_str())
            .with("name", self.name.as_str())
            .with("slug", self.slug.as_str())
            .with("duration", self.duration)
            .with("maxGroupSize", self.max_group_size)
            .with("difficulty", self.difficulty.as_str())
            .with("ratingsAverage", self.ratings_average)
            .with("ratingsQuantity", self.ratings_quantity)
            .with("price", self.price);
        if let Some(discount) = self.price_discount {
            doc.insert("priceDiscount", discount);
        }
        doc.insert("summary", self.summary.as_str());
        doc.insert("description", self.description.as_str());
        if let Some(cover) = &self.image_cover {
            doc.insert("imageCover", cover.as_str());
        }
        doc.insert(
            "images",
            self.images.iter().map(String::as_str).map(Value::from).collect::<Vec<_>>(),
        );
        if let Some(start) = &self.start_location {
            doc.insert("startLocation", start.to_document());
        }
        doc.insert(
            "locations",
            self.locations
                .iter()
                .map(|location| Value::Document(location.to_document()))
                .collect::<Vec<_>>(),
        );
        doc.insert("startDates", self.start_dates.clone());
        doc.insert("secretTour", self.secret_tour);
        if !self.reviews.is_empty() {
            doc.insert(
                "reviews",
                self.reviews
                    .iter()
                    .map(|review| Value::Document(review.to_document()))
                    .collect::<Vec<_>>(),
            );
        }
        doc
    }
}

/// Derive a URL slug: lower-case, runs of non-alphanumerics collapsed to `-`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Parse a start date in any of the formats tours are stored with
///
/// Accepts RFC 3339 (`2021-04-25T09:00:00.000Z`), the seed-data form `2021-04-25,10:00`,
/// a naive `2021-04-25T10:00:00` (taken as UTC) and a plain date (midnight UTC).
pub fn parse_start_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d,%H:%M", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn deserialize_start_dates<'de, D>(deserializer: D) -> Result<Vec<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|value| {
            parse_start_date(value).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid start date {value:?}"))
            })
        })
        .collect()
}
