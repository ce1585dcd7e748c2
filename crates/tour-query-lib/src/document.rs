//! Dynamically typed documents that pipeline stages read and produce
//!
//! A [`Document`] is an insertion-ordered list of named [`Value`]s. Dotted paths such as
//! `startLocation.coordinates` address fields of nested documents.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::cmp::Ordering;
use std::fmt::Write;

/// A single document field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value; floats qualify only when they have no fractional part
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => integral_float(*f),
            _ => None,
        }
    }

    /// Numeric value of ints and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Rank of the value's type in the cross-type sort order
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Date(_) => 4,
            Value::Array(_) => 5,
            Value::Document(_) => 6,
        }
    }

    /// Whether two values belong to the same comparison class
    ///
    /// Ordering comparisons in predicates only apply within one class.
    #[inline]
    pub fn same_class(&self, other: &Value) -> bool {
        self.type_rank() == other.type_rank()
    }

    /// Total ordering used for sorting and min/max accumulators
    ///
    /// null < bool < numbers < strings < dates < arrays < documents.
    /// Ints and floats compare by exact numeric value: `-0.0` equals `0` and large ints are
    /// not rounded to a float. NaN sorts after every other number.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::Float(a), Value::Float(b)) => cmp_floats(*a, *b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Value::Document(a), Value::Document(b)) => a
                .iter()
                .zip(b.iter())
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.total_cmp(vb)))
                .find(|ord| ord.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    /// Equality as used by predicates and grouping (`3` equals `3.0`)
    #[inline]
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }

    /// Canonical text form used to hash group keys
    ///
    /// Values that are `loose_eq` produce the same key.
    pub(crate) fn write_group_key(&self, out: &mut String) {
        match self {
            Value::Null => out.push('n'),
            Value::Bool(b) => {
                let _ = write!(out, "b{b}");
            }
            Value::Int(i) => {
                let _ = write!(out, "i{i}");
            }
            Value::Float(f) if f.is_nan() => out.push_str("nan"),
            Value::Float(f) => match integral_float(*f) {
                Some(i) => {
                    let _ = write!(out, "i{i}");
                }
                None => {
                    let _ = write!(out, "f{}", f.to_bits());
                }
            },
            Value::String(s) => {
                let _ = write!(out, "s{}:{s}", s.len());
            }
            Value::Date(d) => {
                let _ = write!(out, "d{}", d.timestamp_millis());
            }
            Value::Array(items) => {
                out.push('[');
                for item in items {
                    item.write_group_key(out);
                    out.push(',');
                }
                out.push(']');
            }
            Value::Document(doc) => {
                out.push('{');
                for (key, value) in doc.iter() {
                    let _ = write!(out, "{}:{key}=", key.len());
                    value.write_group_key(out);
                    out.push(',');
                }
                out.push('}');
            }
        }
    }
}

/// 2^63, the smallest float above every `i64`
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Whether a float holds an integer representable as `i64`
#[inline]
fn integral_float(float: f64) -> Option<i64> {
    (float.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&float)).then_some(float as i64)
}

/// Numeric float comparison; NaNs are equal to each other and above every number
fn cmp_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

/// Exact comparison of an integer with a float
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    if float.is_nan() || float >= I64_BOUND {
        return Ordering::Less;
    }
    if float < -I64_BOUND {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    int.cmp(&(whole as i64)).then_with(|| cmp_floats(whole, float))
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Value::Int)
            .unwrap_or(Value::Float(value as f64))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// JSON has no date type: strings stay strings
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Document(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Document(doc) => doc.serialize(serializer),
        }
    }
}

/// Insertion-ordered set of named values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a field by dotted path
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_document()?.get(part)?;
        }
        Some(current)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a top-level field, keeping the position of a replaced field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Builder form of [`Document::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field by dotted path, creating intermediate documents as needed
    ///
    /// A non-document value in the middle of the path is replaced by a document.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        match path.split_once('.') {
            None => {
                self.insert(path, value);
            }
            Some((head, rest)) => {
                let needs_document = !matches!(self.get(head), Some(Value::Document(_)));
                if needs_document {
                    self.insert(head, Document::new());
                }
                if let Some((_, Value::Document(child))) =
                    self.fields.iter_mut().find(|(k, _)| k == head)
                {
                    child.set_path(rest, value);
                }
            }
        }
    }

    /// Remove a top-level field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(index).1)
    }

    /// Remove a field by dotted path
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        match path.split_once('.') {
            None => self.remove(path),
            Some((head, rest)) => match self.fields.iter_mut().find(|(k, _)| k == head) {
                Some((_, Value::Document(child))) => child.remove_path(rest),
                _ => None,
            },
        }
    }

    /// Keep only the fields for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.fields.retain(|(k, v)| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (key, value) in iter {
            doc.insert(key, value);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Document {
        Document::new()
            .with("_id", "t1")
            .with("name", "The Forest Hiker")
            .with(
                "startLocation",
                Document::new()
                    .with("type", "Point")
                    .with("coordinates", vec![-80.185942, 25.774772]),
            )
    }

    #[test]
    fn test_get_path() {
        let doc = sample();
        assert_eq!(doc.get_path("name"), Some(&Value::from("The Forest Hiker")));
        assert_eq!(
            doc.get_path("startLocation.type"),
            Some(&Value::from("Point"))
        );
        assert!(doc.get_path("startLocation.missing").is_none());
        assert!(doc.get_path("name.inner").is_none());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut doc = sample();
        let previous = doc.insert("name", "Renamed");
        assert_eq!(previous, Some(Value::from("The Forest Hiker")));
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["_id", "name", "startLocation"]);
    }

    #[test]
    fn test_set_and_remove_path() {
        let mut doc = sample();
        doc.set_path("meta.source.kind", "import");
        assert_eq!(doc.get_path("meta.source.kind"), Some(&Value::from("import")));

        assert_eq!(
            doc.remove_path("startLocation.type"),
            Some(Value::from("Point"))
        );
        assert!(doc.get_path("startLocation.type").is_none());
        assert!(doc.get_path("startLocation.coordinates").is_some());
    }

    #[test]
    fn test_total_cmp_mixed_numbers() {
        assert_eq!(Value::Int(3).total_cmp(&Value::Float(3.0)), Ordering::Equal);
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(2.5)), Ordering::Less);
        assert!(Value::Int(3).loose_eq(&Value::Float(3.0)));
    }

    #[test]
    fn test_signed_zeros_compare_equal() {
        assert!(Value::Float(-0.0).loose_eq(&Value::Float(0.0)));
        assert!(Value::Float(-0.0).loose_eq(&Value::Int(0)));
        assert!(Value::Int(0).loose_eq(&Value::Float(-0.0)));
        assert_eq!(Value::Float(-0.0).total_cmp(&Value::Float(0.0)), Ordering::Equal);

        let mut negative = String::new();
        let mut positive = String::new();
        Value::Float(-0.0).write_group_key(&mut negative);
        Value::Int(0).write_group_key(&mut positive);
        assert_eq!(negative, positive);
    }

    #[test]
    fn test_large_ints_compare_exactly_with_floats() {
        let two_pow_53 = 9_007_199_254_740_992_i64;
        let above = Value::Int(two_pow_53 + 1);
        let float = Value::Float(two_pow_53 as f64);

        assert!(!above.loose_eq(&float));
        assert_eq!(above.total_cmp(&float), Ordering::Greater);
        assert_eq!(float.total_cmp(&above), Ordering::Less);
        assert!(Value::Int(two_pow_53).loose_eq(&float));
        assert_eq!(Value::Int(i64::MAX).total_cmp(&Value::Float(i64::MAX as f64)), Ordering::Less);
        assert!(Value::Int(i64::MIN).loose_eq(&Value::Float(i64::MIN as f64)));
        assert_eq!(Value::Int(-3).total_cmp(&Value::Float(-2.5)), Ordering::Less);
        assert_eq!(Value::Int(-2).total_cmp(&Value::Float(-2.5)), Ordering::Greater);

        let key = |value: &Value| {
            let mut out = String::new();
            value.write_group_key(&mut out);
            out
        };
        assert_ne!(key(&above), key(&float));
        assert_eq!(key(&Value::Int(two_pow_53)), key(&float));
        assert_eq!(key(&Value::Int(i64::MIN)), key(&Value::Float(i64::MIN as f64)));
    }

    #[test]
    fn test_nan_sorts_after_numbers() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan.total_cmp(&Value::Float(f64::INFINITY)), Ordering::Greater);
        assert_eq!(Value::Int(i64::MAX).total_cmp(&nan), Ordering::Less);
        assert_eq!(nan.total_cmp(&Value::Float(-f64::NAN)), Ordering::Equal);
        assert_eq!(nan.total_cmp(&Value::from("a")), Ordering::Less);
    }

    #[test]
    fn test_total_cmp_across_types() {
        let date = Utc.with_ymd_and_hms(2021, 3, 21, 0, 0, 0).unwrap();
        let ordered = [
            Value::Null,
            Value::Bool(false),
            Value::Int(-5),
            Value::from("a"),
            Value::Date(date),
            Value::Array(vec![]),
            Value::Document(Document::new()),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(pair[0].total_cmp(&pair[1]), Ordering::Less, "{pair:?}");
        }
    }

    #[test]
    fn test_group_key_merges_integral_floats() {
        let mut a = String::new();
        let mut b = String::new();
        Value::Int(7).write_group_key(&mut a);
        Value::Float(7.0).write_group_key(&mut b);
        assert_eq!(a, b);

        let mut c = String::new();
        Value::from("7").write_group_key(&mut c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_serialize_to_json() {
        let date = Utc.with_ymd_and_hms(2021, 6, 19, 9, 0, 0).unwrap();
        let doc = sample()
            .with("startDates", vec![date])
            .with("secretTour", false)
            .with("priceDiscount", Value::Null);

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            json,
            json!({
                "_id": "t1",
                "name": "The Forest Hiker",
                "startLocation": {"type": "Point", "coordinates": [-80.185942, 25.774772]},
                "startDates": ["2021-06-19T09:00:00.000Z"],
                "secretTour": false,
                "priceDiscount": null
            })
        );
    }

    #[test]
    fn test_from_json_value() {
        let value = Value::from(json!({"price": 397, "ratingsAverage": 4.7, "tags": ["a"]}));
        let doc = value.as_document().unwrap();
        assert_eq!(doc.get("price"), Some(&Value::Int(397)));
        assert_eq!(doc.get("ratingsAverage"), Some(&Value::Float(4.7)));
        assert_eq!(doc.get("tags"), Some(&Value::Array(vec![Value::from("a")])));
    }
}
