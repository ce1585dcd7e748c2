//! Listing options: filtering, sorting, field selection and pagination

use crate::pipeline::{CmpOp, Pipeline, Predicate, SortKey, Stage};
use crate::{Config, Difficulty, ValidationError, Value};

/// Query keys that configure the listing instead of filtering it
const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Tour fields that can be filtered on, with the kind of value they hold
///
/// `secretTour` is not among them: listings never contain secret tours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Number,
    Text,
    Difficulty,
}

fn field_kind(field: &str) -> Option<FieldKind> {
    match field {
        "duration" | "maxGroupSize" | "ratingsAverage" | "ratingsQuantity" | "price"
        | "priceDiscount" => Some(FieldKind::Number),
        "_id" | "name" | "slug" | "summary" => Some(FieldKind::Text),
        "difficulty" => Some(FieldKind::Difficulty),
        _ => None,
    }
}

/// Parse a filter value according to the field it applies to
fn filter_value(field: &str, kind: FieldKind, raw: &str) -> Result<Value, ValidationError> {
    let raw = raw.trim();
    match kind {
        FieldKind::Number => {
            let number: f64 = raw.parse().map_err(|_| {
                ValidationError::InvalidFilter(format!("{field} expects a number, got {raw:?}"))
            })?;
            if !number.is_finite() {
                return Err(ValidationError::InvalidFilter(format!(
                    "{field} expects a finite number, got {raw:?}"
                )));
            }
            Ok(Value::Float(number))
        }
        FieldKind::Text => Ok(Value::from(raw)),
        FieldKind::Difficulty => Ok(Value::from(raw.parse::<Difficulty>()?.as_str())),
    }
}

/// Split `price[gte]` into field and operator; a bare key means equality
fn split_filter_key(key: &str) -> Result<(&str, CmpOp), ValidationError> {
    match key.split_once('[') {
        None => Ok((key, CmpOp::Eq)),
        Some((field, rest)) => {
            let op = rest
                .strip_suffix(']')
                .and_then(CmpOp::from_name)
                .ok_or_else(|| ValidationError::InvalidFilter(format!("unsupported operator in {key:?}")))?;
            Ok((field, op))
        }
    }
}

fn parse_pagination(key: &str, raw: &str) -> Result<usize, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| ValidationError::InvalidPagination(format!("{key} must be a non-negative integer, got {raw:?}")))
}

/// How a tour listing is filtered, ordered, shaped and paged
///
/// A plain configuration value: the engine reads it and never changes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOptions {
    pub filter: Option<Predicate>,
    /// Empty keeps store order
    pub sort: Vec<SortKey>,
    /// `None` returns every field
    pub fields: Option<Vec<String>>,
    /// 1-based page number
    pub page: usize,
    /// `None` uses the configured default page size
    pub limit: Option<usize>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filter: None,
            sort: Vec::new(),
            fields: None,
            page: 1,
            limit: None,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five best-rated tours, cheapest first among equal ratings
    pub fn top_tours() -> Self {
        Self::new()
            .with_limit(5)
            .with_sort("-ratingsAverage,price")
            .with_fields("name,price,ratingsAverage,difficulty")
    }

    /// Add a filter; combined with an existing one, both must hold
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Sort keys in textual form, e.g. `-ratingsAverage,price`
    pub fn with_sort(mut self, list: &str) -> Self {
        self.sort = SortKey::parse_list(list);
        self
    }

    /// Field selection in textual form, e.g. `name,price`
    pub fn with_fields(mut self, list: &str) -> Self {
        let fields: Vec<String> = list
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        self.fields = (!fields.is_empty()).then_some(fields);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build options from query-string pairs
    ///
    /// `sort`, `fields`, `page` and `limit` configure the listing. Every other key filters:
    /// `difficulty=easy` tests equality and `price[lt]=500` applies the bracketed operator
    /// (`eq`, `ne`, `lt`, `lte`, `gt`, `gte`). Values are parsed according to the field's type.
    pub fn from_query<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref().trim(), value.as_ref());
            match key {
                "sort" => options = options.with_sort(value),
                "fields" => options = options.with_fields(value),
                "page" => options.page = parse_pagination(key, value)?,
                "limit" => options.limit = Some(parse_pagination(key, value)?),
                _ => {
                    let (field, op) = split_filter_key(key)?;
                    if RESERVED_KEYS.contains(&field) {
                        return Err(ValidationError::InvalidFilter(format!(
                            "{field} does not take an operator"
                        )));
                    }
                    let kind = field_kind(field).ok_or_else(|| {
                        ValidationError::InvalidFilter(format!("unknown field {field:?}"))
                    })?;
                    let literal = filter_value(field, kind, value)?;
                    options = options.with_filter(Predicate::compare(field, op, literal));
                }
            }
        }
        Ok(options)
    }

    /// Effective page size under `config`
    pub fn effective_limit(&self, config: &Config) -> Result<usize, ValidationError> {
        let limit = self.limit.unwrap_or(config.default_page_size);
        if limit == 0 {
            return Err(ValidationError::InvalidPagination(
                "limit must be at least 1".to_string(),
            ));
        }
        if limit > config.max_page_size {
            tracing::debug!(limit, max = config.max_page_size, "page size clamped");
            return Ok(config.max_page_size);
        }
        Ok(limit)
    }

    /// Pipeline implementing these options: match, sort, skip, limit, project
    pub fn pipeline(&self, config: &Config) -> Result<Pipeline, ValidationError> {
        if self.page == 0 {
            return Err(ValidationError::InvalidPagination(
                "page must be at least 1".to_string(),
            ));
        }
        let limit = self.effective_limit(config)?;
        let skip = (self.page - 1).checked_mul(limit).ok_or_else(|| {
            ValidationError::InvalidPagination(format!("page {} is out of range", self.page))
        })?;

        let mut pipeline = Pipeline::new();
        if let Some(filter) = &self.filter {
            pipeline.push(Stage::Match(filter.clone()));
        }
        if !self.sort.is_empty() {
            pipeline.push(Stage::Sort(self.sort.clone()));
        }
        if skip > 0 {
            pipeline.push(Stage::Skip(skip));
        }
        pipeline.push(Stage::Limit(limit));
        if let Some(fields) = &self.fields {
            pipeline.push(Stage::include(fields.iter().cloned()));
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Projection, SortDirection};

    #[test]
    fn test_defaults() {
        let options = ListOptions::default();
        assert_eq!(options.page, 1);
        assert!(options.filter.is_none() && options.sort.is_empty() && options.fields.is_none());

        let pipeline = options.pipeline(&Config::default()).unwrap();
        assert_eq!(pipeline.stages(), [Stage::Limit(100)]);
    }

    #[test]
    fn test_top_tours() {
        let options = ListOptions::top_tours();
        assert_eq!(options.limit, Some(5));
        assert_eq!(
            options.sort,
            vec![SortKey::desc("ratingsAverage"), SortKey::asc("price")]
        );
        assert_eq!(
            options.fields.as_deref(),
            Some(
                &[
                    "name".to_string(),
                    "price".to_string(),
                    "ratingsAverage".to_string(),
                    "difficulty".to_string()
                ][..]
            )
        );
    }

    #[test]
    fn test_pipeline_stage_order() {
        let options = ListOptions::new()
            .with_filter(Predicate::eq("difficulty", "easy"))
            .with_sort("price")
            .with_fields("name")
            .with_page(3)
            .with_limit(10);
        let pipeline = options.pipeline(&Config::default()).unwrap();
        let names: Vec<_> = pipeline.stages().iter().map(Stage::name).collect();
        assert_eq!(names, ["match", "sort", "skip", "limit", "project"]);
        assert_eq!(pipeline.stages()[2], Stage::Skip(20));
        assert_eq!(
            pipeline.stages()[4],
            Stage::Project(Projection::Include(vec!["name".to_string()]))
        );
    }

    #[test]
    fn test_pagination_validation() {
        let config = Config::default();
        assert!(matches!(
            ListOptions::new().with_page(0).pipeline(&config),
            Err(ValidationError::InvalidPagination(_))
        ));
        assert!(matches!(
            ListOptions::new().with_limit(0).pipeline(&config),
            Err(ValidationError::InvalidPagination(_))
        ));
        assert!(matches!(
            ListOptions::new().with_page(usize::MAX).with_limit(2).pipeline(&config),
            Err(ValidationError::InvalidPagination(_))
        ));
        assert_eq!(
            ListOptions::new().with_limit(50_000).effective_limit(&config),
            Ok(1000)
        );
    }

    #[test]
    fn test_from_query() {
        let options = ListOptions::from_query([
            ("difficulty", "easy"),
            ("price[lt]", "1500"),
            ("ratingsAverage[gte]", "4.7"),
            ("sort", "-price"),
            ("fields", "name,price"),
            ("page", "2"),
            ("limit", "3"),
        ])
        .unwrap();

        assert_eq!(options.page, 2);
        assert_eq!(options.limit, Some(3));
        assert_eq!(options.sort, vec![SortKey::desc("price")]);
        assert_eq!(options.sort[0].direction, SortDirection::Descending);
        assert_eq!(
            options.filter,
            Some(Predicate::And(vec![
                Predicate::eq("difficulty", "easy"),
                Predicate::lt("price", 1500.0),
                Predicate::gte("ratingsAverage", 4.7),
            ]))
        );
    }

    #[test]
    fn test_from_query_rejects_bad_input() {
        let bad: [(&str, &str); 8] = [
            ("price[regex]", "1"),
            ("price[gte", "1"),
            ("price", "cheap"),
            ("difficulty", "extreme"),
            ("owner", "me"),
            ("page", "-1"),
            ("limit[gt]", "5"),
            ("secretTour", "true"),
        ];
        for pair in bad {
            assert!(ListOptions::from_query([pair]).is_err(), "{pair:?} accepted");
        }
        assert_eq!(
            ListOptions::from_query([("difficulty", "extreme")]),
            Err(ValidationError::UnknownDifficulty("extreme".to_string()))
        );
    }

    #[test]
    fn test_secret_flag_is_not_filterable() {
        for value in ["true", "false"] {
            assert!(matches!(
                ListOptions::from_query([("secretTour", value)]),
                Err(ValidationError::InvalidFilter(_))
            ));
        }
    }
}
