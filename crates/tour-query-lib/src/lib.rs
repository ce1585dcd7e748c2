//! Tour Query Library - Spatial Search and Aggregation over Tour Records
//!
//! This library implements the query core of a tour-booking service: radius search around a
//! point, distance ranking, and multi-stage aggregation summaries over a collection of tours.
//! HTTP, rendering and persistence live elsewhere; callers hand in already-parsed parameters
//! and get structured result sets back.
//!
//! # Architecture
//!
//! - **[`utils`]**: Distance units and spherical geometry (angular radius, great-circle distance)
//! - **[`pipeline`]**: Declarative aggregation stages and the executor that interprets them
//! - **[`Tour`]**: Typed tour records and their conversion into pipeline [`Document`]s
//! - **[`MemoryStore`]**: Immutable snapshot implementing the [`TourStore`] collaborator interface
//! - **[`TourQueries`]**: The entry points (radius search, distance ranking, summaries, listing)
//!
//! # Concurrency
//!
//! Every operation reads an immutable snapshot and builds its own result sequence, so queries
//! can run concurrently from any number of threads. Long pipelines can be abandoned through a
//! [`pipeline::Cancellation`] handle.

mod document;
mod listing;
mod params;
pub mod pipeline;
mod queries;
mod store;
mod summary;
mod tour;
pub mod utils;

// Public API exports
pub use document::{Document, Value};
pub use listing::ListOptions;
pub use params::{CenterPoint, DistanceQuery, RadiusQuery, Year};
pub use queries::TourQueries;
pub use store::{CollectionInfo, Config, MemoryStore, TourStore};
pub use summary::{
    DifficultyStats, MonthlyPlan, TourDistance, difficulty_stats_pipeline, monthly_plan_pipeline,
};
pub use tour::{Difficulty, GeometryKind, Location, Review, Tour};
pub use utils::DistanceUnit;

/// Caller input that cannot be used to run a query
///
/// Always reported back to the caller; never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please provide a {0}")]
    MissingField(&'static str),

    #[error("Invalid number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Radius must be greater than zero, got {0}")]
    NonPositiveRadius(f64),

    #[error("Unsupported distance unit {0:?}, expected \"mi\" or \"km\"")]
    UnsupportedUnit(String),

    #[error("Invalid year {0:?}, expected a 4-digit year")]
    InvalidYear(String),

    #[error("Unknown difficulty {0:?}")]
    UnknownDifficulty(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),
}

/// Failures of the record store or of query execution against it
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid tour record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("Duplicate {field} {value:?}")]
    DuplicateKey { field: &'static str, value: String },

    #[error("No tour found with {0}")]
    NotFound(String),

    #[error("Query execution failed: {0}")]
    Execution(String),
}

/// Error returned by every query entry point
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Query cancelled")]
    Cancelled,
}

impl QueryError {
    /// Whether the failure was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::Validation(_) | QueryError::Store(StoreError::NotFound(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that all public types are accessible
        let _: fn(Config) -> MemoryStore = MemoryStore::new;
        let _: fn() -> Config = Config::default;
        let _: fn(MemoryStore) -> TourQueries<MemoryStore> = TourQueries::new;
    }

    #[test]
    fn test_client_error_classification() {
        let validation = QueryError::from(ValidationError::MissingField("latitude"));
        assert!(validation.is_client_error());

        let missing = QueryError::from(StoreError::NotFound("id \"x\"".to_string()));
        assert!(missing.is_client_error());

        let execution = QueryError::from(StoreError::Execution("boom".to_string()));
        assert!(!execution.is_client_error());
        assert!(!QueryError::Cancelled.is_client_error());
    }

    #[test]
    fn test_missing_field_message_names_the_field() {
        let err = ValidationError::MissingField("latitude");
        assert_eq!(err.to_string(), "Please provide a latitude");
    }
}
