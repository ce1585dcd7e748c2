//! Expressions and predicates evaluated against documents

use crate::{Document, Value, utils};
use chrono::Datelike;
use geo::Point;

/// A value computed from a document
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Value of a field (dotted path); missing fields evaluate to null
    Field(String),
    Literal(Value),
    /// Calendar month (1-12, UTC) of a date; null for anything else
    Month(Box<Expression>),
}

impl Expression {
    pub fn field(path: impl Into<String>) -> Self {
        Expression::Field(path.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn month_of(inner: Expression) -> Self {
        Expression::Month(Box::new(inner))
    }

    pub fn eval(&self, doc: &Document) -> Value {
        match self {
            Expression::Field(path) => doc.get_path(path).cloned().unwrap_or(Value::Null),
            Expression::Literal(value) => value.clone(),
            Expression::Month(inner) => match inner.eval(doc) {
                Value::Date(date) => Value::from(date.month()),
                _ => Value::Null,
            },
        }
    }
}

/// Comparison operator of a [`Predicate::Compare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    /// Operator from its query-string name (`gte`, `lt`, ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(CmpOp::Eq),
            "ne" => Some(CmpOp::Ne),
            "lt" => Some(CmpOp::Lt),
            "lte" => Some(CmpOp::Lte),
            "gt" => Some(CmpOp::Gt),
            "gte" => Some(CmpOp::Gte),
            _ => None,
        }
    }
}

/// Boolean condition on a document
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: CmpOp,
        value: Value,
    },
    /// All must hold; an empty list always holds
    And(Vec<Predicate>),
    /// Any must hold; an empty list never holds
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// The point stored at `field` lies within `angular_radius` radians of `center`
    WithinSphere {
        field: String,
        center: Point<f64>,
        angular_radius: f64,
    },
}

impl Predicate {
    pub fn compare(field: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Lte, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CmpOp::Gte, value)
    }

    /// `low <= field <= high`
    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        let field = field.into();
        Predicate::And(vec![
            Self::gte(field.clone(), low),
            Self::lte(field, high),
        ])
    }

    pub fn within_sphere(field: impl Into<String>, center: Point<f64>, angular_radius: f64) -> Self {
        Predicate::WithinSphere {
            field: field.into(),
            center,
            angular_radius,
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut all) => {
                all.push(other);
                Predicate::And(all)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Predicate::Compare { field, op, value } => compare_field(doc.get_path(field), *op, value),
            Predicate::And(all) => all.iter().all(|p| p.matches(doc)),
            Predicate::Or(any) => any.iter().any(|p| p.matches(doc)),
            Predicate::Not(inner) => !inner.matches(doc),
            Predicate::WithinSphere {
                field,
                center,
                angular_radius,
            } => doc
                .get_path(field)
                .and_then(point_from_value)
                .is_some_and(|point| utils::within_spherical_cap(point, *center, *angular_radius)),
        }
    }
}

/// Compare a (possibly missing) field against a literal
///
/// Array fields match when any element matches, except for `Ne` which requires that no
/// element equals the literal.
fn compare_field(field: Option<&Value>, op: CmpOp, literal: &Value) -> bool {
    let actual = field.unwrap_or(&Value::Null);
    match (actual, literal) {
        (Value::Array(items), literal) if !matches!(literal, Value::Array(_)) => match op {
            CmpOp::Ne => !items.iter().any(|item| item.loose_eq(literal)),
            _ => items.iter().any(|item| compare_scalar(item, op, literal)),
        },
        _ => compare_scalar(actual, op, literal),
    }
}

fn compare_scalar(actual: &Value, op: CmpOp, literal: &Value) -> bool {
    // Ordering only applies within one type class and never to null
    let ordered = || !actual.is_null() && !literal.is_null() && actual.same_class(literal);
    match op {
        CmpOp::Eq => actual.loose_eq(literal),
        CmpOp::Ne => !actual.loose_eq(literal),
        CmpOp::Lt => ordered() && actual.total_cmp(literal).is_lt(),
        CmpOp::Lte => ordered() && actual.total_cmp(literal).is_le(),
        CmpOp::Gt => ordered() && actual.total_cmp(literal).is_gt(),
        CmpOp::Gte => ordered() && actual.total_cmp(literal).is_ge(),
    }
}

/// Read a `[longitude, latitude]` pair, or a GeoJSON point document holding one
pub(crate) fn point_from_value(value: &Value) -> Option<Point<f64>> {
    match value {
        Value::Array(items) if items.len() == 2 => {
            let point = Point::new(items[0].as_f64()?, items[1].as_f64()?);
            utils::is_valid_coordinate(&point).then_some(point)
        }
        Value::Document(doc) => doc.get("coordinates").and_then(point_from_value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tour_doc() -> Document {
        Document::new()
            .with("name", "The Park Camper")
            .with("price", 1497)
            .with("ratingsAverage", 4.9)
            .with("difficulty", "medium")
            .with(
                "startDates",
                vec![
                    Utc.with_ymd_and_hms(2021, 8, 5, 10, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2022, 3, 20, 10, 0, 0).unwrap(),
                ],
            )
            .with(
                "startLocation",
                Document::new().with("coordinates", vec![-118.076152, 34.113596]),
            )
    }

    #[test]
    fn test_field_and_literal() {
        let doc = tour_doc();
        assert_eq!(Expression::field("price").eval(&doc), Value::Int(1497));
        assert_eq!(Expression::field("missing").eval(&doc), Value::Null);
        assert_eq!(Expression::literal(3).eval(&doc), Value::Int(3));
    }

    #[test]
    fn test_month_of_date() {
        let doc = Document::new().with("d", Utc.with_ymd_and_hms(2021, 8, 5, 0, 0, 0).unwrap());
        assert_eq!(Expression::month_of(Expression::field("d")).eval(&doc), Value::Int(8));
        assert_eq!(Expression::month_of(Expression::literal("x")).eval(&doc), Value::Null);
    }

    #[test]
    fn test_numeric_comparisons() {
        let doc = tour_doc();
        assert!(Predicate::gte("ratingsAverage", 3).matches(&doc));
        assert!(Predicate::gt("price", 1000.5).matches(&doc));
        assert!(!Predicate::lt("price", 1497).matches(&doc));
        assert!(Predicate::lte("price", 1497.0).matches(&doc));
        assert!(Predicate::eq("price", 1497.0).matches(&doc));
    }

    #[test]
    fn test_missing_and_mismatched_fields() {
        let doc = tour_doc();
        assert!(!Predicate::gte("missing", 0).matches(&doc));
        assert!(Predicate::ne("missing", 0).matches(&doc));
        assert!(Predicate::eq("missing", Value::Null).matches(&doc));
        // strings never order against numbers
        assert!(!Predicate::gt("difficulty", 0).matches(&doc));
    }

    #[test]
    fn test_array_fields_match_any_element() {
        let doc = tour_doc();
        let in_2022 = Predicate::between(
            "startDates",
            Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2022, 12, 31, 0, 0, 0).unwrap(),
        );
        // between is two independent comparisons, each satisfied by some element
        assert!(in_2022.matches(&doc));

        assert!(!Predicate::gt(
            "startDates",
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        )
        .matches(&doc));
    }

    #[test]
    fn test_boolean_combinators() {
        let doc = tour_doc();
        let cheap_or_easy = Predicate::Or(vec![
            Predicate::lt("price", 500),
            Predicate::eq("difficulty", "easy"),
        ]);
        assert!(!cheap_or_easy.matches(&doc));
        assert!(cheap_or_easy.negate().matches(&doc));
        assert!(Predicate::And(vec![]).matches(&doc));
        assert!(!Predicate::Or(vec![]).matches(&doc));

        let combined = Predicate::eq("difficulty", "medium").and(Predicate::gte("price", 1000));
        assert!(combined.matches(&doc));
    }

    #[test]
    fn test_within_sphere() {
        let doc = tour_doc();
        let center = Point::new(-118.113491, 34.111745);
        assert!(Predicate::within_sphere("startLocation.coordinates", center, 0.01).matches(&doc));
        assert!(Predicate::within_sphere("startLocation", center, 0.01).matches(&doc));
        assert!(!Predicate::within_sphere("startLocation.coordinates", center, 0.0001).matches(&doc));
        assert!(!Predicate::within_sphere("missing", center, 3.0).matches(&doc));
    }

    #[test]
    fn test_point_from_value_rejects_out_of_range() {
        assert!(point_from_value(&Value::from(vec![10.0, 20.0])).is_some());
        assert!(point_from_value(&Value::from(vec![10.0, 95.0])).is_none());
        assert!(point_from_value(&Value::from(vec![10.0])).is_none());
        assert!(point_from_value(&Value::from("10,20")).is_none());
    }

    #[test]
    fn test_cmp_op_names() {
        assert_eq!(CmpOp::from_name("gte"), Some(CmpOp::Gte));
        assert_eq!(CmpOp::from_name("regex"), None);
    }
}
