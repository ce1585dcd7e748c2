//! Fixed summary pipelines and their typed result rows

use crate::pipeline::{
    Accumulator, Expression, GROUP_KEY_FIELD, Pipeline, Predicate, SortDirection, Stage,
};
use crate::{Document, StoreError, Value, Year};
use serde::{Deserialize, Serialize};

/// Tours rated below this are left out of the difficulty statistics
const MIN_STATS_RATING: f64 = 3.0;

/// Per-difficulty aggregate over well-rated tours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: String,
    pub num_tours: u64,
    pub num_ratings: u64,
    pub avg_ratings: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Tour starts within one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    /// Calendar month, 1-12
    pub month: u32,
    pub num_tour_start: u64,
    /// Names of the starting tours, one entry per start
    pub tour: Vec<String>,
}

/// A tour and its distance from the ranking center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourDistance {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Distance in the unit the ranking asked for
    pub distance: f64,
}

/// `Match(ratingsAverage >= 3)`, group by difficulty, sort by average price
pub fn difficulty_stats_pipeline() -> Pipeline {
    Pipeline::new()
        .then(Stage::Match(Predicate::gte("ratingsAverage", MIN_STATS_RATING)))
        .then(Stage::group(
            Expression::field("difficulty"),
            vec![
                ("numTours", Accumulator::Count),
                ("numRatings", Accumulator::sum("ratingsQuantity")),
                ("avgRatings", Accumulator::avg("ratingsAverage")),
                ("avgPrice", Accumulator::avg("price")),
                ("minPrice", Accumulator::min("price")),
                ("maxPrice", Accumulator::max("price")),
            ],
        ))
        .then(Stage::sort("avgPrice", SortDirection::Ascending))
}

/// Start dates of `year` grouped by month, busiest month first
pub fn monthly_plan_pipeline(year: Year) -> Result<Pipeline, crate::ValidationError> {
    let (start, end) = year.bounds()?;
    Ok(Pipeline::new()
        .then(Stage::unwind("startDates"))
        .then(Stage::Match(Predicate::between("startDates", start, end)))
        .then(Stage::group(
            Expression::month_of(Expression::field("startDates")),
            vec![
                ("numTourStart", Accumulator::Count),
                ("tour", Accumulator::collect("name")),
            ],
        ))
        .then(Stage::add_field("month", Expression::field(GROUP_KEY_FIELD)))
        .then(Stage::exclude([GROUP_KEY_FIELD]))
        .then(Stage::sort("numTourStart", SortDirection::Descending)))
}

fn malformed(row: &Document, reason: &str) -> StoreError {
    StoreError::Execution(format!("malformed summary row ({reason}): {row:?}"))
}

fn number(row: &Document, field: &str) -> Result<f64, StoreError> {
    row.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed(row, field))
}

fn count(row: &Document, field: &str) -> Result<u64, StoreError> {
    row.get(field)
        .and_then(Value::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| malformed(row, field))
}

fn text(row: &Document, field: &str) -> Result<String, StoreError> {
    row.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed(row, field))
}

impl TryFrom<&Document> for DifficultyStats {
    type Error = StoreError;

    fn try_from(row: &Document) -> Result<Self, Self::Error> {
        Ok(Self {
            difficulty: text(row, GROUP_KEY_FIELD)?,
            num_tours: count(row, "numTours")?,
            num_ratings: count(row, "numRatings")?,
            avg_ratings: number(row, "avgRatings")?,
            avg_price: number(row, "avgPrice")?,
            min_price: number(row, "minPrice")?,
            max_price: number(row, "maxPrice")?,
        })
    }
}

impl TryFrom<&Document> for MonthlyPlan {
    type Error = StoreError;

    fn try_from(row: &Document) -> Result<Self, Self::Error> {
        let month = count(row, "month")
            .ok()
            .and_then(|m| u32::try_from(m).ok())
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| malformed(row, "month"))?;
        let tour = row
            .get("tour")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed(row, "tour"))?
            .iter()
            .map(|name| name.as_str().map(str::to_string).ok_or_else(|| malformed(row, "tour")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            month,
            num_tour_start: count(row, "numTourStart")?,
            tour,
        })
    }
}

impl TryFrom<&Document> for TourDistance {
    type Error = StoreError;

    fn try_from(row: &Document) -> Result<Self, Self::Error> {
        Ok(Self {
            id: text(row, GROUP_KEY_FIELD)?,
            name: text(row, "name")?,
            distance: number(row, "distance")?,
        })
    }
}

/// Convert pipeline output rows into typed results
pub(crate) fn rows<'a, T>(docs: &'a [Document]) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<&'a Document, Error = StoreError>,
{
    docs.iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ExecutionContext;
    use chrono::{TimeZone, Utc};

    fn tour(name: &str, difficulty: &str, rating: f64, quantity: i64, price: f64) -> Document {
        Document::new()
            .with("_id", name)
            .with("name", name)
            .with("difficulty", difficulty)
            .with("ratingsAverage", rating)
            .with("ratingsQuantity", quantity)
            .with("price", price)
    }

    #[test]
    fn test_difficulty_stats_two_levels() {
        let docs = vec![
            tour("A", "easy", 4.0, 10, 100.0),
            tour("B", "easy", 2.0, 99, 5.0),
            tour("C", "medium", 4.5, 3, 300.0),
            tour("D", "easy", 5.0, 6, 200.0),
        ];
        let out = difficulty_stats_pipeline()
            .execute(docs, &ExecutionContext::default())
            .unwrap();
        let stats: Vec<DifficultyStats> = rows(&out).unwrap();

        assert_eq!(
            stats,
            vec![
                DifficultyStats {
                    difficulty: "easy".to_string(),
                    num_tours: 2,
                    num_ratings: 16,
                    avg_ratings: 4.5,
                    avg_price: 150.0,
                    min_price: 100.0,
                    max_price: 200.0,
                },
                DifficultyStats {
                    difficulty: "medium".to_string(),
                    num_tours: 1,
                    num_ratings: 3,
                    avg_ratings: 4.5,
                    avg_price: 300.0,
                    min_price: 300.0,
                    max_price: 300.0,
                },
            ]
        );
    }

    #[test]
    fn test_difficulty_stats_drop_low_rated_tours() {
        let docs = vec![
            tour("A", "easy", 4.0, 10, 100.0),
            tour("B", "easy", 2.0, 5, 200.0),
        ];
        let out = difficulty_stats_pipeline()
            .execute(docs, &ExecutionContext::default())
            .unwrap();
        let stats: Vec<DifficultyStats> = rows(&out).unwrap();

        assert_eq!(
            stats,
            vec![DifficultyStats {
                difficulty: "easy".to_string(),
                num_tours: 1,
                num_ratings: 10,
                avg_ratings: 4.0,
                avg_price: 100.0,
                min_price: 100.0,
                max_price: 100.0,
            }]
        );
    }

    #[test]
    fn test_monthly_plan_pipeline() {
        let at = |y: i32, m: u32, d: u32| Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap();
        let docs = vec![
            Document::new()
                .with("name", "X")
                .with("startDates", vec![at(2021, 3, 5), at(2021, 7, 1), at(2022, 3, 1)]),
            Document::new().with("name", "Y").with("startDates", vec![at(2021, 7, 9)]),
            Document::new()
                .with("name", "Z")
                .with("startDates", vec![Utc.with_ymd_and_hms(2021, 12, 31, 23, 30, 0).unwrap()]),
        ];
        let pipeline = monthly_plan_pipeline(Year::parse("2021").unwrap()).unwrap();
        let out = pipeline.execute(docs, &ExecutionContext::default()).unwrap();
        let plan: Vec<MonthlyPlan> = rows(&out).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan[0],
            MonthlyPlan {
                month: 7,
                num_tour_start: 2,
                tour: vec!["X".to_string(), "Y".to_string()],
            }
        );
        assert_eq!(plan.iter().map(|p| p.num_tour_start).sum::<u64>(), 4);
        assert!(plan.iter().any(|p| p.month == 12 && p.tour == ["Z"]));
        assert!(out.iter().all(|row| !row.contains_key(GROUP_KEY_FIELD)));
    }

    #[test]
    fn test_malformed_rows_are_execution_errors() {
        let row = Document::new().with("_id", "easy").with("numTours", "many");
        let result = DifficultyStats::try_from(&row);
        assert!(matches!(result, Err(StoreError::Execution(_))));

        let row = Document::new()
            .with("month", 13)
            .with("numTourStart", 1)
            .with("tour", vec!["X"]);
        assert!(MonthlyPlan::try_from(&row).is_err());
    }

    #[test]
    fn test_serialize_rows_camel_case() {
        let plan = MonthlyPlan {
            month: 7,
            num_tour_start: 2,
            tour: vec!["X".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&plan).unwrap(),
            serde_json::json!({"month": 7, "numTourStart": 2, "tour": ["X"]})
        );

        let distance = TourDistance {
            id: "t1".to_string(),
            name: "The Forest Hiker".to_string(),
            distance: 12.5,
        };
        assert_eq!(
            serde_json::to_value(&distance).unwrap(),
            serde_json::json!({"_id": "t1", "name": "The Forest Hiker", "distance": 12.5})
        );
    }
}
