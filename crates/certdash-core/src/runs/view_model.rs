//! Page state for the workflow run list.
//!
//! `RunListViewModel` is the view boundary: every request failure is logged
//! and surfaced through the [`Notifier`], aborts are swallowed, and the page
//! keeps whatever data it already had. Actions that the UI would disable
//! (canceling a finished run, deleting an unfinished one) are rejected before
//! any request is issued.

use std::collections::BTreeSet;
use std::sync::Arc;

use certdash_types::error::{RepositoryError, RunActionError};
use certdash_types::run::{RunId, RunListQuery, RunPage, RunPatch, WorkflowRun};
use tokio_util::sync::CancellationToken;

use super::detail::DetailOverlay;
use super::reconciler::{PatchOutcome, Reconciler, SyncReport};
use crate::notify::{Notifier, report_request_error};
use crate::repository::workflow_run::WorkflowRunRepository;

/// One page of workflow runs with selection, live updates and a detail view.
///
/// Owned and mutated by a single task. Dropping it releases every live
/// subscription it holds.
pub struct RunListViewModel<R: WorkflowRunRepository> {
    repo: Arc<R>,
    notifier: Arc<dyn Notifier>,
    query: RunListQuery,
    rows: Vec<WorkflowRun>,
    total: u64,
    selected: BTreeSet<RunId>,
    reconciler: Reconciler,
    detail: DetailOverlay,
    last_error: Option<String>,
}

impl<R: WorkflowRunRepository> RunListViewModel<R> {
    pub fn new(repo: Arc<R>, notifier: Arc<dyn Notifier>, query: RunListQuery) -> Self {
        Self {
            repo,
            notifier,
            query,
            rows: Vec::new(),
            total: 0,
            selected: BTreeSet::new(),
            reconciler: Reconciler::new(),
            detail: DetailOverlay::default(),
            last_error: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn query(&self) -> &RunListQuery {
        &self.query
    }

    pub fn rows(&self) -> &[WorkflowRun] {
        &self.rows
    }

    pub fn row(&self, id: &RunId) -> Option<&WorkflowRun> {
        self.rows.iter().find(|r| &r.id == id)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn selected(&self) -> &BTreeSet<RunId> {
        &self.selected
    }

    pub fn detail(&self) -> &DetailOverlay {
        &self.detail
    }

    pub fn is_subscribed(&self, id: &RunId) -> bool {
        self.reconciler.is_subscribed(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.reconciler.subscription_count()
    }

    /// Message of the last failed load, cleared by the next successful one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// 1-based position of a row across all pages.
    pub fn row_number(&self, index: usize) -> u64 {
        u64::from(self.query.page - 1) * u64::from(self.query.per_page) + index as u64 + 1
    }

    pub fn can_cancel(&self, id: &RunId) -> bool {
        self.row(id).is_some_and(WorkflowRun::is_in_flight)
    }

    pub fn can_delete(&self, id: &RunId) -> bool {
        self.row(id).is_some_and(|r| r.status.is_terminal())
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Fetch the current page and resubscribe its in-flight rows.
    ///
    /// Returns whether the page was replaced. Firing `cancel` aborts the
    /// request silently. When it fires while rows are being subscribed, the
    /// fetched rows stay but every subscription is torn down.
    pub async fn load(&mut self, cancel: &CancellationToken) -> bool {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RepositoryError::Aborted),
            result = self.repo.list(&self.query) => result,
        };

        match fetched {
            Ok(page) => {
                self.replace_page(page);
                match self.reconciler.sync(&*self.repo, &self.rows, cancel).await {
                    Ok(report) => self.log_sync(&report),
                    Err(err) => {
                        self.teardown();
                        self.report(&err);
                    }
                }
                true
            }
            Err(err) => {
                if !err.is_abort() {
                    self.last_error = Some(err.to_string());
                }
                self.report(&err);
                false
            }
        }
    }

    /// Switch to another page (or page size) and reload.
    pub async fn set_page(&mut self, page: u32, per_page: u32, cancel: &CancellationToken) -> bool {
        self.reset();
        self.query = RunListQuery::new(self.query.workflow_id.clone(), page, per_page)
            .with_expand(self.query.expand);
        self.load(cancel).await
    }

    /// Switch the workflow filter, go back to the first page and reload.
    pub async fn set_workflow(
        &mut self,
        workflow_id: Option<String>,
        cancel: &CancellationToken,
    ) -> bool {
        self.reset();
        self.query =
            RunListQuery::new(workflow_id, 1, self.query.per_page).with_expand(self.query.expand);
        self.load(cancel).await
    }

    fn replace_page(&mut self, page: RunPage) {
        let previous = std::mem::take(&mut self.rows);
        self.rows = page
            .items
            .into_iter()
            .map(|fetched| match previous.iter().find(|r| r.id == fetched.id) {
                Some(held) if !held.accepts(&fetched) => {
                    tracing::debug!(run_id = %held.id, "keeping newer row over fetched snapshot");
                    held.clone()
                }
                _ => fetched,
            })
            .collect();
        self.total = page.total_items;
        self.selected.clear();
        self.last_error = None;

        for row in &self.rows {
            if self.detail.is_showing(&row.id) {
                self.detail.merge(row);
            }
        }
    }

    fn log_sync(&self, report: &SyncReport) {
        tracing::debug!(
            page = self.query.page,
            rows = self.rows.len(),
            total = self.total,
            subscribed = report.subscribed,
            released = report.released,
            failed = report.failed,
            "run page loaded"
        );
    }

    // -----------------------------------------------------------------------
    // Realtime
    // -----------------------------------------------------------------------

    /// Wait for the next realtime patch addressed to this view.
    pub async fn next_patch(&mut self) -> Option<RunPatch> {
        self.reconciler.next_patch().await
    }

    pub fn apply_patch(&mut self, patch: RunPatch) -> PatchOutcome {
        let outcome = self.reconciler.apply(
            &*self.repo,
            patch.clone(),
            &mut self.rows,
            &mut self.detail,
        );
        if outcome == PatchOutcome::Removed {
            self.total = self.total.saturating_sub(1);
            self.selected.remove(&patch.record.id);
        }
        outcome
    }

    /// Apply every patch already queued. Returns how many changed the page.
    pub fn drain_patches(&mut self) -> usize {
        let mut changed = 0;
        while let Some(patch) = self.reconciler.try_next_patch() {
            if self.apply_patch(patch).changed() {
                changed += 1;
            }
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Replace the selection. Ids not on the current page are ignored.
    pub fn select<I: IntoIterator<Item = RunId>>(&mut self, ids: I) {
        self.selected = ids
            .into_iter()
            .filter(|id| self.rows.iter().any(|r| &r.id == id))
            .collect();
    }

    /// Toggle one row. Returns whether it is now selected.
    pub fn toggle(&mut self, id: &RunId) -> bool {
        if self.selected.remove(id) {
            return false;
        }
        if self.row(id).is_none() {
            return false;
        }
        self.selected.insert(id.clone());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Cancel an in-flight run, then reload the page.
    pub async fn cancel_run(
        &mut self,
        id: &RunId,
        cancel: &CancellationToken,
    ) -> Result<bool, RunActionError> {
        let row = self
            .row(id)
            .ok_or_else(|| RunActionError::NotOnPage(id.clone()))?;
        if !row.is_in_flight() {
            return Err(RunActionError::NotCancellable {
                id: id.clone(),
                status: row.status,
            });
        }
        let workflow_id = row.workflow_id.clone();

        let accepted = self
            .repo
            .cancel(&workflow_id, id)
            .await
            .inspect_err(|err| self.report(err))?;
        if accepted {
            tracing::info!(run_id = %id, "run cancel requested");
            self.load(cancel).await;
        }
        Ok(accepted)
    }

    /// Delete one finished run, then reload the page.
    pub async fn delete_run(
        &mut self,
        id: &RunId,
        cancel: &CancellationToken,
    ) -> Result<bool, RunActionError> {
        let row = self
            .row(id)
            .ok_or_else(|| RunActionError::NotOnPage(id.clone()))?;
        if row.is_in_flight() {
            return Err(RunActionError::NotDeletable {
                id: id.clone(),
                status: row.status,
            });
        }

        let removed = self
            .repo
            .remove(std::slice::from_ref(id))
            .await
            .inspect_err(|err| self.report(err))?;
        if removed {
            self.drop_rows(std::slice::from_ref(id));
            tracing::info!(run_id = %id, "run deleted");
            self.load(cancel).await;
        }
        Ok(removed)
    }

    /// Delete every selected run that has finished, then reload the page.
    ///
    /// In-flight rows are left out of the request. Returns the number of runs
    /// removed; the total drops by exactly that many.
    pub async fn delete_selected(&mut self, cancel: &CancellationToken) -> Result<usize, RunActionError> {
        let (finished, unfinished): (Vec<&WorkflowRun>, Vec<&WorkflowRun>) = self
            .rows
            .iter()
            .filter(|r| self.selected.contains(&r.id))
            .partition(|r| r.status.is_terminal());
        if !unfinished.is_empty() {
            tracing::debug!(skipped = unfinished.len(), "excluding unfinished runs from delete");
        }
        let ids: Vec<RunId> = finished.into_iter().map(|r| r.id.clone()).collect();
        if ids.is_empty() {
            return Err(RunActionError::NothingToDelete);
        }

        let removed = self
            .repo
            .remove(&ids)
            .await
            .inspect_err(|err| self.report(err))?;
        if !removed {
            return Ok(0);
        }

        self.drop_rows(&ids);
        tracing::info!(count = ids.len(), "runs deleted");
        self.load(cancel).await;
        Ok(ids.len())
    }

    fn drop_rows(&mut self, ids: &[RunId]) {
        let before = self.rows.len();
        self.rows.retain(|r| !ids.contains(&r.id));
        let dropped = (before - self.rows.len()) as u64;
        self.total = self.total.saturating_sub(dropped);
        for id in ids {
            self.selected.remove(id);
        }
    }

    // -----------------------------------------------------------------------
    // Detail
    // -----------------------------------------------------------------------

    /// Open the detail view on a displayed run.
    pub fn open_detail(&mut self, id: &RunId) -> bool {
        match self.row(id).cloned() {
            Some(run) => {
                self.detail.open(run);
                true
            }
            None => false,
        }
    }

    /// Close the detail view. Subscriptions are unaffected.
    pub fn close_detail(&mut self) -> Option<WorkflowRun> {
        self.detail.close()
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Release every live subscription regardless of status.
    ///
    /// Returns the number of unsubscribe calls issued. Calling it again is a
    /// no-op until the next load.
    pub fn teardown(&mut self) -> usize {
        let released = self.reconciler.teardown(&*self.repo);
        if released > 0 {
            tracing::debug!(released, "run list torn down");
        }
        released
    }

    fn reset(&mut self) {
        self.teardown();
        self.selected.clear();
    }

    fn report(&self, err: &RepositoryError) {
        report_request_error(self.notifier.as_ref(), err);
    }
}

impl<R: WorkflowRunRepository> Drop for RunListViewModel<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}
