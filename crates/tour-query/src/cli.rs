//! Command line arguments and command execution

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tour_query_lib::{
    Config, DistanceQuery, ListOptions, MemoryStore, QueryError, RadiusQuery, StoreError, Tour,
    TourQueries, ValidationError, Year,
};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Tour Query - radius search, distance ranking and summaries over tour collections
pub struct Cli {
    /// Tour JSON files to load (an array of tours or a single tour each)
    #[clap(short, long = "data", value_name = "FILE", env = "TOURS_DATA", value_delimiter = ',', required = true)]
    pub data: Vec<PathBuf>,

    /// Pretty-print the JSON output
    #[clap(long)]
    pub pretty: bool,

    /// Log filter directives, e.g. `debug` or `tour_query_lib=trace`
    #[clap(long, env = "RUST_LOG", value_name = "FILTER")]
    pub log: Option<String>,

    /// Page size of listings that do not ask for one
    #[clap(long, default_value = "100")]
    pub default_page_size: usize,

    /// Upper bound for requested page sizes
    #[clap(long, default_value = "1000")]
    pub max_page_size: usize,

    /// Collections with at least this many tours are scanned in parallel
    #[clap(long, default_value = "2048")]
    pub parallel_threshold: usize,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Tours starting within a radius of a point
    Within {
        /// Radius, in `unit`
        #[clap(allow_hyphen_values = true)]
        distance: String,
        /// Center as `lat,lng`
        #[clap(allow_hyphen_values = true)]
        latlng: String,
        /// `mi` or `km`
        unit: String,
    },
    /// All tours ranked by distance from a point
    Distances {
        /// Center as `lat,lng`
        #[clap(allow_hyphen_values = true)]
        latlng: String,
        /// `mi` or `km`
        unit: String,
    },
    /// Statistics per difficulty over tours rated 3 or more
    Stats,
    /// Tour starts per month of a year
    Plan {
        /// Four-digit year
        year: String,
    },
    /// The five best-rated tours
    Top,
    /// Filtered, sorted and paged listing
    List {
        /// Filter such as `difficulty=easy` or `price[lt]=500` (repeatable)
        #[clap(long = "where", value_name = "KEY=VALUE")]
        filters: Vec<String>,
        /// Sort keys, e.g. `-ratingsAverage,price`
        #[clap(long, allow_hyphen_values = true)]
        sort: Option<String>,
        /// Fields to keep, e.g. `name,price`
        #[clap(long)]
        fields: Option<String>,
        #[clap(long)]
        page: Option<String>,
        #[clap(long)]
        limit: Option<String>,
    },
    /// A tour by identifier
    Get { id: String },
    /// A tour by slug
    Slug { slug: String },
    /// Collection summary
    Info,
}

/// A validated command, ready to run against a store
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Within(RadiusQuery),
    Distances(DistanceQuery),
    Stats,
    Plan(Year),
    List(ListOptions),
    Get(String),
    Slug(String),
    Info,
}

impl Command {
    /// Validate the command's parameters
    pub fn into_request(self) -> Result<Request, ValidationError> {
        Ok(match self {
            Command::Within {
                distance,
                latlng,
                unit,
            } => Request::Within(RadiusQuery::parse(&distance, &latlng, &unit)?),
            Command::Distances { latlng, unit } => {
                Request::Distances(DistanceQuery::parse(&latlng, &unit)?)
            }
            Command::Stats => Request::Stats,
            Command::Plan { year } => Request::Plan(Year::parse(&year)?),
            Command::Top => Request::List(ListOptions::top_tours()),
            Command::List {
                filters,
                sort,
                fields,
                page,
                limit,
            } => {
                let mut pairs = Vec::with_capacity(filters.len() + 4);
                for filter in &filters {
                    let (key, value) = filter.split_once('=').ok_or_else(|| {
                        ValidationError::InvalidFilter(format!("expected KEY=VALUE, got {filter:?}"))
                    })?;
                    pairs.push((key.to_string(), value.to_string()));
                }
                let options = [("sort", sort), ("fields", fields), ("page", page), ("limit", limit)];
                for (key, value) in options {
                    if let Some(value) = value {
                        pairs.push((key.to_string(), value));
                    }
                }
                Request::List(ListOptions::from_query(pairs)?)
            }
            Command::Get { id } => Request::Get(id),
            Command::Slug { slug } => Request::Slug(slug),
            Command::Info => Request::Info,
        })
    }
}

impl Cli {
    /// Engine configuration from the command line
    pub fn config(&self) -> Config {
        Config {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            parallel_threshold: self.parallel_threshold,
        }
    }
}

/// Failure of a command line invocation
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl From<ValidationError> for CliError {
    fn from(err: ValidationError) -> Self {
        CliError::Query(err.into())
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        CliError::Query(err.into())
    }
}

impl CliError {
    /// Process exit status: 2 for invalid input, 1 for everything else
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Query(QueryError::Validation(_)) => 2,
            _ => 1,
        }
    }
}

/// Validate the command, load the data files and print the result as JSON
pub fn run(cli: &Cli, out: &mut impl Write) -> Result<(), CliError> {
    profiling::scope!("cli::run");

    let request = cli.command.clone().into_request()?;
    let store = MemoryStore::load_from_files(cli.data.clone(), cli.config())?;
    tracing::info!(files = cli.data.len(), tours = store.len(), "tours loaded");
    let queries = TourQueries::new(store);

    match request {
        Request::Within(query) => {
            let found = queries.tours_within(&query)?;
            let tours: Vec<&Tour> = found.iter().map(|tour| &**tour).collect();
            write_json(out, &tours, cli.pretty)
        }
        Request::Distances(query) => write_json(out, &queries.distances(&query)?, cli.pretty),
        Request::Stats => write_json(out, &queries.tour_stats()?, cli.pretty),
        Request::Plan(year) => write_json(out, &queries.monthly_plan(year)?, cli.pretty),
        Request::List(options) => write_json(out, &queries.list_tours(&options)?, cli.pretty),
        Request::Get(id) => write_json(out, &*queries.get_tour(&id)?, cli.pretty),
        Request::Slug(slug) => {
            write_json(out, &*queries.get_tour_by_slug(&slug)?, cli.pretty)
        }
        Request::Info => write_json(out, &queries.store().info(), cli.pretty),
    }
}

fn write_json<T: Serialize + ?Sized>(
    out: &mut impl Write,
    value: &T,
    pretty: bool,
) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    writeln!(out)?;
    Ok(())
}
