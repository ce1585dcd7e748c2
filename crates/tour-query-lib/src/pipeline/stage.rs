//! Pipeline stage variants

use super::{Expression, Predicate};
use geo::Point;

/// Field that holds the group key in the output of a [`Stage::Group`]
pub const GROUP_KEY_FIELD: &str = "_id";

/// Field a [`Stage::NearestTo`] reads locations from unless told otherwise
pub const DEFAULT_LOCATION_FIELD: &str = "startLocation.coordinates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One key of a sort specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Parse one token: `price` sorts ascending, `-price` descending
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        match token.strip_prefix('-') {
            Some(field) if !field.is_empty() => Some(Self::desc(field)),
            Some(_) => None,
            None if !token.is_empty() => Some(Self::asc(token)),
            None => None,
        }
    }

    /// Parse a comma- or whitespace-separated list such as `-ratingsAverage, price`
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(|c: char| c == ',' || c.is_whitespace())
            .filter_map(Self::parse)
            .collect()
    }
}

/// Per-group reducer of a [`Stage::Group`]
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Count,
    Sum(Expression),
    Avg(Expression),
    Min(Expression),
    Max(Expression),
    /// Gather every value into a list, in input order
    Collect(Expression),
}

impl Accumulator {
    pub fn sum(field: &str) -> Self {
        Accumulator::Sum(Expression::field(field))
    }

    pub fn avg(field: &str) -> Self {
        Accumulator::Avg(Expression::field(field))
    }

    pub fn min(field: &str) -> Self {
        Accumulator::Min(Expression::field(field))
    }

    pub fn max(field: &str) -> Self {
        Accumulator::Max(Expression::field(field))
    }

    pub fn collect(field: &str) -> Self {
        Accumulator::Collect(Expression::field(field))
    }
}

/// Field selection of a [`Stage::Project`]; the two modes are exclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only these top-level fields (and `_id`)
    Include(Vec<String>),
    /// Drop these fields (dotted paths allowed)
    Exclude(Vec<String>),
}

/// One declarative step of an aggregation pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Keep documents satisfying the predicate
    Match(Predicate),
    /// Emit one copy per element of the array at the path
    Unwind(String),
    /// Partition by key and reduce every partition
    Group {
        key: Expression,
        accumulators: Vec<(String, Accumulator)>,
    },
    /// Attach a computed value under `name`
    AddField { name: String, expr: Expression },
    Project(Projection),
    /// Stable sort; the first key is the most significant
    Sort(Vec<SortKey>),
    /// Annotate every document with its distance to `center` and sort ascending
    NearestTo {
        center: Point<f64>,
        distance_field: String,
        /// Applied to the distance in meters
        multiplier: f64,
        location_field: String,
    },
    Skip(usize),
    Limit(usize),
}

impl Stage {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "match",
            Stage::Unwind(_) => "unwind",
            Stage::Group { .. } => "group",
            Stage::AddField { .. } => "add_field",
            Stage::Project(_) => "project",
            Stage::Sort(_) => "sort",
            Stage::NearestTo { .. } => "nearest_to",
            Stage::Skip(_) => "skip",
            Stage::Limit(_) => "limit",
        }
    }

    pub fn unwind(path: impl Into<String>) -> Self {
        Stage::Unwind(path.into())
    }

    pub fn group(key: Expression, accumulators: Vec<(&str, Accumulator)>) -> Self {
        Stage::Group {
            key,
            accumulators: accumulators
                .into_iter()
                .map(|(name, acc)| (name.to_string(), acc))
                .collect(),
        }
    }

    pub fn add_field(name: impl Into<String>, expr: Expression) -> Self {
        Stage::AddField {
            name: name.into(),
            expr,
        }
    }

    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Stage::Project(Projection::Include(
            fields.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Stage::Project(Projection::Exclude(
            fields.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn sort(field: impl Into<String>, direction: SortDirection) -> Self {
        Stage::Sort(vec![SortKey {
            field: field.into(),
            direction,
        }])
    }

    /// Distance ranking against the default start-location field
    pub fn nearest_to(center: Point<f64>, distance_field: impl Into<String>, multiplier: f64) -> Self {
        Stage::NearestTo {
            center,
            distance_field: distance_field.into(),
            multiplier,
            location_field: DEFAULT_LOCATION_FIELD.to_string(),
        }
    }
}
