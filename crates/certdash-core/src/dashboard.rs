//! Dashboard overview: backend statistics plus the latest runs across every
//! workflow, each run carrying its workflow's name.
//!
//! Both requests are issued together. A failure in one is reported through
//! the [`Notifier`] and leaves the other half intact.

use std::sync::Arc;

use certdash_types::error::RepositoryError;
use certdash_types::run::{RunListQuery, WorkflowRun};
use certdash_types::statistics::Statistics;
use tokio_util::sync::CancellationToken;

use crate::notify::{Notifier, report_request_error};
use crate::repository::statistics::StatisticsRepository;
use crate::repository::workflow_run::WorkflowRunRepository;

/// Number of runs the overview shows by default.
pub const LATEST_RUNS: u32 = 15;

/// Query for the newest `limit` runs of any workflow, with workflows expanded.
pub fn latest_runs_query(limit: u32) -> RunListQuery {
    RunListQuery::new(None, 1, limit).with_expand(true)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSnapshot {
    /// `None` when the statistics request failed or was aborted.
    pub statistics: Option<Statistics>,
    pub latest_runs: Vec<WorkflowRun>,
    /// Total runs across all workflows, as reported with the latest page.
    pub total_runs: u64,
    /// Requests that failed for a reason other than an abort.
    pub failures: usize,
}

pub struct Dashboard<S, R> {
    statistics: Arc<S>,
    runs: Arc<R>,
    notifier: Arc<dyn Notifier>,
}

impl<S: StatisticsRepository, R: WorkflowRunRepository> Dashboard<S, R> {
    pub fn new(statistics: Arc<S>, runs: Arc<R>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            statistics,
            runs,
            notifier,
        }
    }

    /// Fetch statistics and the newest `limit` runs. Firing `cancel` aborts
    /// both requests silently.
    pub async fn load(&self, limit: u32, cancel: &CancellationToken) -> DashboardSnapshot {
        let query = latest_runs_query(limit);
        let (statistics, runs) = tokio::select! {
            biased;
            _ = cancel.cancelled() => (Err(RepositoryError::Aborted), Err(RepositoryError::Aborted)),
            both = async { tokio::join!(self.statistics.get(), self.runs.list(&query)) } => both,
        };

        let mut snapshot = DashboardSnapshot::default();
        match statistics {
            Ok(statistics) => snapshot.statistics = Some(statistics),
            Err(err) => self.report(&err, &mut snapshot),
        }
        match runs {
            Ok(page) => {
                snapshot.total_runs = page.total_items;
                snapshot.latest_runs = page.items;
            }
            Err(err) => self.report(&err, &mut snapshot),
        }
        tracing::debug!(
            has_statistics = snapshot.statistics.is_some(),
            runs = snapshot.latest_runs.len(),
            "dashboard loaded"
        );
        snapshot
    }

    fn report(&self, err: &RepositoryError, snapshot: &mut DashboardSnapshot) {
        if !err.is_abort() {
            snapshot.failures += 1;
        }
        report_request_error(self.notifier.as_ref(), err);
    }
}
