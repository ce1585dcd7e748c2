//! Logging setup for the command line front-end
//!
//! Logs go to stderr so stdout carries nothing but query results.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Debug builds log more by default
const DEFAULT_FILTER: &str = if cfg!(debug_assertions) {
    "info,tour_query_lib=debug"
} else {
    "warn"
};

/// Install the global subscriber with the given filter directives
///
/// Invalid directives fall back to the default filter with a warning.
pub fn setup_logging(directives: Option<&str>) {
    let (filter, invalid) = match directives.map(EnvFilter::try_new) {
        Some(Ok(filter)) => (filter, None),
        Some(Err(err)) => (EnvFilter::new(DEFAULT_FILTER), Some(err)),
        None => (EnvFilter::new(DEFAULT_FILTER), None),
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(fmt_layer).init();

    if let Some(err) = invalid {
        tracing::warn!(%err, default = DEFAULT_FILTER, "invalid log filter, using default");
    }
    tracing::debug!("logging initialized");
}
