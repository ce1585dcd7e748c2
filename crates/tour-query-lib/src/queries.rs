//! Query entry points
//!
//! Every operation validates its parameters first (the typed parameter structs cannot be
//! built from bad input), then builds a fresh pipeline or filter and runs it against the
//! store. Nothing here keeps state between calls.

use crate::pipeline::{ExecutionContext, Pipeline, Predicate, Stage};
use crate::summary::{self, DifficultyStats, MonthlyPlan, TourDistance};
use crate::{
    Config, DistanceQuery, Document, ListOptions, RadiusQuery, Result, StoreError, Tour,
    TourStore, Year,
};
use std::sync::Arc;

/// Field distances are written to by the ranking
const DISTANCE_FIELD: &str = "distance";

/// Query facade over a [`TourStore`]
///
/// Page sizes and parallelism come from the store's [`Config`].
#[derive(Debug, Clone)]
pub struct TourQueries<S: TourStore> {
    store: S,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<S: TourStore> TourQueries<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &Config {
        self.store.config()
    }

    /// Fresh execution context for one request
    pub fn context(&self) -> ExecutionContext {
        self.config().execution_context()
    }

    /// Tours starting within the query radius, in store order
    pub fn tours_within(&self, query: &RadiusQuery) -> Result<Vec<Arc<Tour>>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("queries::tours_within");

        let angular_radius = query.angular_radius();
        tracing::debug!(
            lon = query.center.longitude(),
            lat = query.center.latitude(),
            radius = query.radius,
            unit = %query.unit,
            angular_radius,
            "radius search"
        );
        let filter = Predicate::within_sphere(
            crate::pipeline::DEFAULT_LOCATION_FIELD,
            query.center.point(),
            angular_radius,
        );
        Ok(self.store.find(&filter)?)
    }

    /// Pipeline ranking tours by distance from the query center
    pub fn distance_pipeline(query: &DistanceQuery) -> Pipeline {
        Pipeline::new()
            .then(Stage::nearest_to(
                query.center.point(),
                DISTANCE_FIELD,
                query.multiplier(),
            ))
            .then(Stage::include(["name", DISTANCE_FIELD]))
    }

    /// Tours ordered by distance from the query center, nearest first
    pub fn distances(&self, query: &DistanceQuery) -> Result<Vec<TourDistance>> {
        self.distances_with(query, &self.context())
    }

    pub fn distances_with(
        &self,
        query: &DistanceQuery,
        ctx: &ExecutionContext,
    ) -> Result<Vec<TourDistance>> {
        tracing::debug!(
            lon = query.center.longitude(),
            lat = query.center.latitude(),
            unit = %query.unit,
            "distance ranking"
        );
        let docs = self.store.run_pipeline(&Self::distance_pipeline(query), ctx)?;
        Ok(summary::rows(&docs)?)
    }

    /// Statistics per difficulty over tours rated 3 or more, cheapest on average first
    pub fn tour_stats(&self) -> Result<Vec<DifficultyStats>> {
        self.tour_stats_with(&self.context())
    }

    pub fn tour_stats_with(&self, ctx: &ExecutionContext) -> Result<Vec<DifficultyStats>> {
        let docs = self
            .store
            .run_pipeline(&summary::difficulty_stats_pipeline(), ctx)?;
        Ok(summary::rows(&docs)?)
    }

    /// Tour starts per month of `year`, busiest month first
    pub fn monthly_plan(&self, year: Year) -> Result<Vec<MonthlyPlan>> {
        self.monthly_plan_with(year, &self.context())
    }

    pub fn monthly_plan_with(&self, year: Year, ctx: &ExecutionContext) -> Result<Vec<MonthlyPlan>> {
        let pipeline = summary::monthly_plan_pipeline(year)?;
        tracing::debug!(%year, "monthly plan");
        let docs = self.store.run_pipeline(&pipeline, ctx)?;
        Ok(summary::rows(&docs)?)
    }

    /// Filtered, sorted and paged tour documents
    pub fn list_tours(&self, options: &ListOptions) -> Result<Vec<Document>> {
        self.list_tours_with(options, &self.context())
    }

    pub fn list_tours_with(
        &self,
        options: &ListOptions,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Document>> {
        let pipeline = options.pipeline(self.config())?;
        self.store.run_pipeline(&pipeline, ctx)
    }

    /// The five best-rated tours
    pub fn top_tours(&self) -> Result<Vec<Document>> {
        self.list_tours(&ListOptions::top_tours())
    }

    /// Look a tour up by identifier; secret tours included
    pub fn get_tour(&self, id: &str) -> Result<Arc<Tour>> {
        self.store
            .find_by_id(id)?
            .ok_or_else(|| StoreError::NotFound(format!("id {id:?}")).into())
    }

    /// Look a tour up by slug; secret tours included
    pub fn get_tour_by_slug(&self, slug: &str) -> Result<Arc<Tour>> {
        self.store
            .find_by_slug(slug)?
            .ok_or_else(|| StoreError::NotFound(format!("slug {slug:?}")).into())
    }
}
