//! MemoryStore - Immutable in-memory snapshot of the tour collection
//!
//! This module provides the [`TourStore`] collaborator interface the query entry points run
//! against, and an in-memory implementation that loads tours from JSON and keeps both the
//! typed records and their pipeline documents.

use crate::pipeline::{ExecutionContext, Pipeline, Predicate};
use crate::{Document, StoreError, Tour};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Configuration for the query engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Page size of listings that do not ask for one.
    /// Default: 100
    pub default_page_size: usize,
    /// Larger page sizes are clamped to this value.
    /// Default: 1000
    pub max_page_size: usize,
    /// Collections with at least this many tours are scanned with rayon.
    /// Default: 2048
    pub parallel_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
            parallel_threshold: 2048,
        }
    }
}

impl Config {
    /// Execution context carrying this configuration's parallelism settings
    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::new().with_parallel_threshold(self.parallel_threshold)
    }
}

/// Information about the tour collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    /// Number of tours loaded, secret ones included
    pub tour_count: usize,
    /// Number of tours hidden from listings
    pub secret_count: usize,
    /// Total number of scheduled start dates
    pub start_date_count: usize,
}

/// Record store the query entry points run against
///
/// Listing operations (`find`, `run_pipeline`) never see secret tours; lookups by
/// identifier or slug do.
pub trait TourStore: Send + Sync {
    /// Configuration queries against this store run with
    fn config(&self) -> &Config;

    /// All visible tours matching `filter`, in store order
    fn find(&self, filter: &Predicate) -> Result<Vec<Arc<Tour>>, StoreError>;

    /// Run `pipeline` over the documents of all visible tours
    fn run_pipeline(&self, pipeline: &Pipeline, ctx: &ExecutionContext)
    -> crate::Result<Vec<Document>>;

    fn find_by_id(&self, id: &str) -> Result<Option<Arc<Tour>>, StoreError>;

    fn find_by_slug(&self, slug: &str) -> Result<Option<Arc<Tour>>, StoreError>;
}

/// A tour together with the document pipelines read
#[derive(Debug)]
struct Record {
    tour: Arc<Tour>,
    document: Document,
}

#[derive(Debug, Default)]
struct Snapshot {
    records: Vec<Record>,
    by_id: HashMap<String, usize>,
    by_slug: HashMap<String, usize>,
}

/// JSON files hold either a list of tours or a single tour
#[derive(Deserialize)]
#[serde(untagged)]
enum TourFile {
    Many(Vec<Tour>),
    One(Box<Tour>),
}

impl TourFile {
    fn into_tours(self) -> Vec<Tour> {
        match self {
            TourFile::Many(tours) => tours,
            TourFile::One(tour) => vec![*tour],
        }
    }
}

/// In-memory [`TourStore`] over an immutable snapshot
///
/// Cloning is cheap: clones share the snapshot.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    snapshot: Arc<Snapshot>,
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MemoryStore {
    /// Create an empty store
    pub fn new(config: Config) -> Self {
        Self {
            snapshot: Arc::new(Snapshot::default()),
            config,
        }
    }

    /// Build a store from tours, validating them in parallel
    ///
    /// Fails on the first invalid record, or when two tours share an `_id` or a slug.
    pub fn from_tours(tours: Vec<Tour>, config: Config) -> Result<Self, StoreError> {
        #[cfg(feature = "profiling")]
        profiling::scope!("store::from_tours");

        let records: Result<Vec<Record>, StoreError> = tours
            .into_par_iter()
            .map(|tour| {
                let tour = tour.prepare()?;
                let document = tour.to_document();
                Ok(Record { tour, document })
            })
            .collect();
        let records = records?;

        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_slug = HashMap::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if by_id.insert(record.tour.id.clone(), index).is_some() {
                return Err(StoreError::DuplicateKey {
                    field: "_id",
                    value: record.tour.id.clone(),
                });
            }
            if by_slug.insert(record.tour.slug.clone(), index).is_some() {
                return Err(StoreError::DuplicateKey {
                    field: "slug",
                    value: record.tour.slug.clone(),
                });
            }
        }

        tracing::info!(tours = records.len(), "tour snapshot built");
        Ok(Self {
            snapshot: Arc::new(Snapshot {
                records,
                by_id,
                by_slug,
            }),
            config,
        })
    }

    /// Load tours from a JSON reader holding an array of tours or a single tour
    pub fn from_reader<R: Read>(reader: R, config: Config) -> Result<Self, StoreError> {
        let file: TourFile = serde_json::from_reader(std::io::BufReader::new(reader))?;
        Self::from_tours(file.into_tours(), config)
    }

    /// Load tours from JSON files in parallel
    pub fn load_from_files<P: AsRef<Path> + Send + Sync>(
        paths: Vec<P>,
        config: Config,
    ) -> Result<Self, StoreError> {
        #[cfg(feature = "profiling")]
        profiling::scope!("store::load_from_files");

        let files: Result<Vec<Vec<Tour>>, StoreError> = paths
            .into_par_iter()
            .map(|path| {
                let path = path.as_ref();
                let file = std::fs::File::open(path)?;
                let parsed: TourFile = serde_json::from_reader(std::io::BufReader::new(file))?;
                let tours = parsed.into_tours();
                tracing::debug!(path = %path.display(), tours = tours.len(), "tour file parsed");
                Ok(tours)
            })
            .collect();

        Self::from_tours(files?.into_iter().flatten().collect(), config)
    }

    /// Get the number of tours, secret ones included
    #[inline]
    pub fn len(&self) -> usize {
        self.snapshot.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.snapshot.records.is_empty()
    }

    /// All tours in store order, secret ones included
    pub fn tours(&self) -> impl Iterator<Item = &Arc<Tour>> {
        self.snapshot.records.iter().map(|record| &record.tour)
    }

    /// Get collection information
    pub fn info(&self) -> CollectionInfo {
        let records = &self.snapshot.records;
        CollectionInfo {
            tour_count: records.len(),
            secret_count: records.iter().filter(|r| r.tour.secret_tour).count(),
            start_date_count: records.iter().map(|r| r.tour.start_dates.len()).sum(),
        }
    }

    fn visible(&self) -> impl Iterator<Item = &Record> {
        self.snapshot
            .records
            .iter()
            .filter(|record| !record.tour.secret_tour)
    }

    fn lookup(&self, index: Option<&usize>) -> Option<Arc<Tour>> {
        index
            .and_then(|&i| self.snapshot.records.get(i))
            .map(|record| record.tour.clone())
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TourStore for MemoryStore {
    #[inline]
    fn config(&self) -> &Config {
        &self.config
    }

    fn find(&self, filter: &Predicate) -> Result<Vec<Arc<Tour>>, StoreError> {
        let records = &self.snapshot.records;
        let keep = |record: &Record| !record.tour.secret_tour && filter.matches(&record.document);

        let found: Vec<Arc<Tour>> = if records.len() >= self.config.parallel_threshold {
            records
                .par_iter()
                .filter(|record| keep(record))
                .map(|record| record.tour.clone())
                .collect()
        } else {
            records
                .iter()
                .filter(|record| keep(record))
                .map(|record| record.tour.clone())
                .collect()
        };
        tracing::debug!(scanned = records.len(), found = found.len(), "find");
        Ok(found)
    }

    fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        ctx: &ExecutionContext,
    ) -> crate::Result<Vec<Document>> {
        let input: Vec<Document> = self.visible().map(|record| record.document.clone()).collect();
        tracing::debug!(stages = pipeline.len(), input = input.len(), "running pipeline");
        pipeline.execute(input, ctx)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Arc<Tour>>, StoreError> {
        Ok(self.lookup(self.snapshot.by_id.get(id)))
    }

    fn find_by_slug(&self, slug: &str) -> Result<Option<Arc<Tour>>, StoreError> {
        Ok(self.lookup(self.snapshot.by_slug.get(slug)))
    }
}
