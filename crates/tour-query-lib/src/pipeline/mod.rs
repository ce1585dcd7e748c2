//! Declarative aggregation pipelines
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. The executor interprets them one after
//! the other, each stage consuming the complete output of its predecessor. Stages are never
//! reordered or fused, so the order they are declared in is the order they run in.
//!
//! ```ignore
//! let pipeline = Pipeline::new()
//!     .then(Stage::Match(Predicate::gte("ratingsAverage", 3)))
//!     .then(Stage::sort("price", SortDirection::Ascending));
//! let out = pipeline.execute(docs, &ExecutionContext::default())?;
//! ```

mod executor;
mod expr;
mod stage;

pub use executor::{Cancellation, ExecutionContext};
pub use expr::{CmpOp, Expression, Predicate};
pub use stage::{
    Accumulator, DEFAULT_LOCATION_FIELD, GROUP_KEY_FIELD, Projection, SortDirection, SortKey,
    Stage,
};

pub(crate) use expr::point_from_value;

/// Ordered sequence of stages, built fresh for every request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Append a stage
    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    #[inline]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FromIterator<Stage> for Pipeline {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

impl Extend<Stage> for Pipeline {
    fn extend<I: IntoIterator<Item = Stage>>(&mut self, iter: I) {
        self.stages.extend(iter);
    }
}
