//! Statistics repository trait definition.

use certdash_types::error::RepositoryError;
use certdash_types::statistics::Statistics;

/// Source of the dashboard counters.
pub trait StatisticsRepository: Send + Sync {
    /// Fetch the current certificate and workflow totals.
    fn get(&self) -> impl std::future::Future<Output = Result<Statistics, RepositoryError>> + Send;
}
