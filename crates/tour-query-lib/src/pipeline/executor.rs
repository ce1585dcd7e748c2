//! Stage interpreter
//!
//! Every stage takes ownership of the previous output and returns a new sequence, so an
//! abandoned run leaves nothing behind.

use super::stage::{Accumulator, GROUP_KEY_FIELD, Projection, SortDirection, SortKey, Stage};
use super::{Expression, Pipeline, Predicate, point_from_value};
use crate::{Config, Document, QueryError, Result, Value, utils};
use geo::Point;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

/// Shared flag to abandon a running pipeline
///
/// Clones share the flag: cancel from any thread, the executor notices before its next stage.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// Per-request execution settings
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    cancellation: Cancellation,
    parallel_threshold: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            cancellation: Cancellation::default(),
            parallel_threshold: Config::default().parallel_threshold,
        }
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Inputs with at least this many documents are evaluated with rayon
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    #[inline]
    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    #[inline]
    fn parallel(&self, len: usize) -> bool {
        len >= self.parallel_threshold
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Pipeline {
    /// Run every stage in declaration order over `input`
    pub fn execute(&self, input: Vec<Document>, ctx: &ExecutionContext) -> Result<Vec<Document>> {
        let mut current = input;
        for (index, stage) in self.stages().iter().enumerate() {
            if ctx.is_cancelled() {
                tracing::debug!(stage = stage.name(), index, "pipeline cancelled");
                return Err(QueryError::Cancelled);
            }
            let input_len = current.len();
            current = run_stage(stage, current, ctx);
            tracing::trace!(
                stage = stage.name(),
                index,
                input = input_len,
                output = current.len(),
                "pipeline stage done"
            );
        }
        Ok(current)
    }
}

fn run_stage(stage: &Stage, docs: Vec<Document>, ctx: &ExecutionContext) -> Vec<Document> {
    match stage {
        Stage::Match(predicate) => exec_match(docs, predicate, ctx),
        Stage::Unwind(path) => exec_unwind(docs, path),
        Stage::Group { key, accumulators } => exec_group(docs, key, accumulators),
        Stage::AddField { name, expr } => exec_add_field(docs, name, expr),
        Stage::Project(projection) => exec_project(docs, projection),
        Stage::Sort(keys) => exec_sort(docs, keys),
        Stage::NearestTo {
            center,
            distance_field,
            multiplier,
            location_field,
        } => exec_nearest_to(docs, *center, distance_field, *multiplier, location_field, ctx),
        Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
        Stage::Limit(n) => {
            let mut docs = docs;
            docs.truncate(*n);
            docs
        }
    }
}

fn exec_match(docs: Vec<Document>, predicate: &Predicate, ctx: &ExecutionContext) -> Vec<Document> {
    if ctx.parallel(docs.len()) {
        // Collecting an indexed parallel iterator keeps input order
        docs.into_par_iter().filter(|doc| predicate.matches(doc)).collect()
    } else {
        docs.into_iter().filter(|doc| predicate.matches(doc)).collect()
    }
}

fn exec_unwind(docs: Vec<Document>, path: &str) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match doc.get_path(path).cloned() {
            Some(Value::Array(items)) => {
                for item in items {
                    let mut copy = doc.clone();
                    copy.set_path(path, item);
                    out.push(copy);
                }
            }
            // Missing, null and empty arrays produce nothing
            None | Some(Value::Null) => {}
            Some(_) => out.push(doc),
        }
    }
    out
}

/// Running state of one accumulator within one group
#[derive(Debug)]
enum AccumulatorState {
    Count(i64),
    Sum {
        int_total: i64,
        float_total: f64,
        integral: bool,
    },
    Avg {
        total: f64,
        count: u64,
    },
    Min(Option<Value>),
    Max(Option<Value>),
    Collect(Vec<Value>),
}

impl AccumulatorState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Count => AccumulatorState::Count(0),
            Accumulator::Sum(_) => AccumulatorState::Sum {
                int_total: 0,
                float_total: 0.0,
                integral: true,
            },
            Accumulator::Avg(_) => AccumulatorState::Avg {
                total: 0.0,
                count: 0,
            },
            Accumulator::Min(_) => AccumulatorState::Min(None),
            Accumulator::Max(_) => AccumulatorState::Max(None),
            Accumulator::Collect(_) => AccumulatorState::Collect(Vec::new()),
        }
    }

    fn update(&mut self, acc: &Accumulator, doc: &Document) {
        match (self, acc) {
            (AccumulatorState::Count(count), Accumulator::Count) => *count += 1,
            (
                AccumulatorState::Sum {
                    int_total,
                    float_total,
                    integral,
                },
                Accumulator::Sum(expr),
            ) => match expr.eval(doc) {
                Value::Int(i) if *integral => match int_total.checked_add(i) {
                    Some(total) => *int_total = total,
                    None => {
                        *integral = false;
                        *float_total = *int_total as f64 + i as f64;
                    }
                },
                Value::Int(i) => *float_total += i as f64,
                Value::Float(f) => {
                    if *integral {
                        *integral = false;
                        *float_total = *int_total as f64;
                    }
                    *float_total += f;
                }
                // Non-numeric values do not contribute
                _ => {}
            },
            (AccumulatorState::Avg { total, count }, Accumulator::Avg(expr)) => {
                if let Some(n) = expr.eval(doc).as_f64() {
                    *total += n;
                    *count += 1;
                }
            }
            (AccumulatorState::Min(current), Accumulator::Min(expr)) => {
                let value = expr.eval(doc);
                if !value.is_null()
                    && current
                        .as_ref()
                        .is_none_or(|cur| value.total_cmp(cur) == Ordering::Less)
                {
                    *current = Some(value);
                }
            }
            (AccumulatorState::Max(current), Accumulator::Max(expr)) => {
                let value = expr.eval(doc);
                if !value.is_null()
                    && current
                        .as_ref()
                        .is_none_or(|cur| value.total_cmp(cur) == Ordering::Greater)
                {
                    *current = Some(value);
                }
            }
            (AccumulatorState::Collect(values), Accumulator::Collect(expr)) => {
                values.push(expr.eval(doc));
            }
            (state, acc) => {
                tracing::warn!(?state, ?acc, "accumulator state mismatch");
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            AccumulatorState::Count(count) => Value::Int(count),
            AccumulatorState::Sum {
                int_total,
                float_total,
                integral,
            } => {
                if integral {
                    Value::Int(int_total)
                } else {
                    Value::Float(float_total)
                }
            }
            AccumulatorState::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float(total / count as f64)
                }
            }
            AccumulatorState::Min(value) | AccumulatorState::Max(value) => {
                value.unwrap_or(Value::Null)
            }
            AccumulatorState::Collect(values) => Value::Array(values),
        }
    }
}

type GroupStates = SmallVec<[AccumulatorState; 8]>;

fn exec_group(
    docs: Vec<Document>,
    key: &Expression,
    accumulators: &[(String, Accumulator)],
) -> Vec<Document> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, GroupStates)> = Vec::new();
    let mut key_text = String::new();

    for doc in &docs {
        let key_value = key.eval(doc);
        key_text.clear();
        key_value.write_group_key(&mut key_text);

        let slot = match index.get(key_text.as_str()) {
            Some(&slot) => slot,
            None => {
                let states = accumulators
                    .iter()
                    .map(|(_, acc)| AccumulatorState::new(acc))
                    .collect();
                groups.push((key_value, states));
                index.insert(key_text.clone(), groups.len() - 1);
                groups.len() - 1
            }
        };

        let (_, states) = &mut groups[slot];
        for (state, (_, acc)) in states.iter_mut().zip(accumulators) {
            state.update(acc, doc);
        }
    }

    // Groups come out in first-seen key order
    groups
        .into_iter()
        .map(|(key_value, states)| {
            let mut out = Document::with_capacity(accumulators.len() + 1);
            out.insert(GROUP_KEY_FIELD, key_value);
            for ((name, _), state) in accumulators.iter().zip(states) {
                out.insert(name.as_str(), state.finish());
            }
            out
        })
        .collect()
}

fn exec_add_field(docs: Vec<Document>, name: &str, expr: &Expression) -> Vec<Document> {
    docs.into_iter()
        .map(|mut doc| {
            let value = expr.eval(&doc);
            doc.set_path(name, value);
            doc
        })
        .collect()
}

fn exec_project(docs: Vec<Document>, projection: &Projection) -> Vec<Document> {
    match projection {
        Projection::Include(fields) => docs
            .into_iter()
            .map(|mut doc| {
                doc.retain(|key, _| key == GROUP_KEY_FIELD || fields.iter().any(|f| f == key));
                doc
            })
            .collect(),
        Projection::Exclude(fields) => docs
            .into_iter()
            .map(|mut doc| {
                for field in fields {
                    doc.remove_path(field);
                }
                doc
            })
            .collect(),
    }
}

fn compare_by_keys(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get_path(&key.field).unwrap_or(&Value::Null);
        let right = b.get_path(&key.field).unwrap_or(&Value::Null);
        let ord = match key.direction {
            SortDirection::Ascending => left.total_cmp(right),
            SortDirection::Descending => right.total_cmp(left),
        };
        if ord.is_ne() {
            return ord;
        }
    }
    Ordering::Equal
}

fn exec_sort(mut docs: Vec<Document>, keys: &[SortKey]) -> Vec<Document> {
    // `sort_by` is stable: ties keep their input order
    docs.sort_by(|a, b| compare_by_keys(a, b, keys));
    docs
}

fn exec_nearest_to(
    docs: Vec<Document>,
    center: Point<f64>,
    distance_field: &str,
    multiplier: f64,
    location_field: &str,
    ctx: &ExecutionContext,
) -> Vec<Document> {
    let measure = |doc: Document| -> Option<(f64, Document)> {
        let point = doc.get_path(location_field).and_then(point_from_value)?;
        Some((utils::great_circle_distance_meters(center, point) * multiplier, doc))
    };

    let input_len = docs.len();
    let mut measured: Vec<(f64, Document)> = if ctx.parallel(input_len) {
        docs.into_par_iter().filter_map(measure).collect()
    } else {
        docs.into_iter().filter_map(measure).collect()
    };
    if measured.len() < input_len {
        tracing::debug!(
            skipped = input_len - measured.len(),
            location_field,
            "documents without a usable location skipped"
        );
    }

    measured.sort_by(|(a, _), (b, _)| a.total_cmp(b));
    measured
        .into_iter()
        .map(|(distance, mut doc)| {
            doc.set_path(distance_field, distance);
            doc
        })
        .collect()
}
