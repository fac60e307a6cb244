//! Realtime reconciliation of run patches into a displayed page.
//!
//! The reconciler keeps exactly the in-flight rows of the current page
//! subscribed. Patches arrive as messages on the view's inbox and are merged
//! by identity: the matching row is replaced, the detail overlay follows, and
//! a row that reaches a terminal status is unsubscribed on the spot.
//!
//! Ordering: patches are applied in arrival order. A patch is dropped when
//! its id is not subscribed, when the row is no longer on the page, or when
//! it is older than the row (by `updated` stamp) or would move a terminal
//! row back into flight.

use certdash_types::error::RepositoryError;
use certdash_types::run::{RealtimeAction, RunId, RunPatch, WorkflowRun};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::detail::DetailOverlay;
use super::registry::SubscriptionRegistry;
use crate::repository::workflow_run::WorkflowRunRepository;

/// Result of bringing subscriptions in line with a freshly loaded page.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub subscribed: usize,
    pub released: usize,
    pub failed: usize,
}

/// What applying one patch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The row was replaced. `released` is true when the patch was terminal
    /// and the subscription was dropped.
    Applied { released: bool },
    /// A delete patch removed the row from the page.
    Removed,
    Ignored(IgnoreReason),
}

impl PatchOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, PatchOutcome::Ignored(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotSubscribed,
    NotOnPage,
    Stale,
}

/// Merges realtime patches into a page and owns the view's subscriptions.
pub struct Reconciler {
    registry: SubscriptionRegistry,
    inbox: mpsc::UnboundedReceiver<RunPatch>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry: SubscriptionRegistry::new(tx),
            inbox: rx,
        }
    }

    pub fn is_subscribed(&self, id: &RunId) -> bool {
        self.registry.contains(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    pub fn subscribed_ids(&self) -> impl Iterator<Item = &RunId> {
        self.registry.ids()
    }

    /// Subscribe every in-flight row of `rows` and release every registered
    /// id that is no longer displayed or no longer in flight.
    ///
    /// Subscribes are issued concurrently. A failed subscribe only costs that
    /// row its live updates. Firing `cancel` returns
    /// [`RepositoryError::Aborted`] without registering anything new.
    pub async fn sync<R: WorkflowRunRepository>(
        &mut self,
        repo: &R,
        rows: &[WorkflowRun],
        cancel: &CancellationToken,
    ) -> Result<SyncReport, RepositoryError> {
        let mut report = SyncReport::default();

        let stale: Vec<RunId> = self
            .registry
            .ids()
            .filter(|id| !rows.iter().any(|r| &r.id == *id && r.is_in_flight()))
            .cloned()
            .collect();
        for id in &stale {
            if self.registry.release(repo, id) {
                report.released += 1;
            }
        }

        let wanted: Vec<RunId> = rows
            .iter()
            .filter(|r| r.is_in_flight())
            .map(|r| r.id.clone())
            .collect();
        for (id, outcome) in self.registry.subscribe_all(repo, &wanted, cancel).await? {
            match outcome {
                Ok(()) => report.subscribed += 1,
                Err(err) => {
                    tracing::warn!(run_id = %id, error = %err, "live updates unavailable for run");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Merge one patch into `rows` and `detail`.
    pub fn apply<R: WorkflowRunRepository>(
        &mut self,
        repo: &R,
        patch: RunPatch,
        rows: &mut Vec<WorkflowRun>,
        detail: &mut DetailOverlay,
    ) -> PatchOutcome {
        let id = patch.record.id.clone();
        if !self.registry.contains(&id) {
            tracing::trace!(run_id = %id, "dropping patch for unsubscribed run");
            return PatchOutcome::Ignored(IgnoreReason::NotSubscribed);
        }

        let Some(index) = rows.iter().position(|r| r.id == id) else {
            self.registry.release(repo, &id);
            tracing::debug!(run_id = %id, "dropping patch for run no longer on page");
            return PatchOutcome::Ignored(IgnoreReason::NotOnPage);
        };

        if patch.action == RealtimeAction::Delete {
            rows.remove(index);
            self.registry.release(repo, &id);
            return PatchOutcome::Removed;
        }

        if !rows[index].accepts(&patch.record) {
            tracing::debug!(
                run_id = %id,
                current = %rows[index].status,
                incoming = %patch.record.status,
                "dropping stale patch"
            );
            return PatchOutcome::Ignored(IgnoreReason::Stale);
        }

        // Realtime records never carry expanded relations.
        let mut record = patch.record;
        if record.expand.is_none() {
            record.expand = rows[index].expand.take();
        }

        detail.merge(&record);
        let terminal = record.status.is_terminal();
        rows[index] = record;

        let released = terminal && self.registry.release(repo, &id);
        PatchOutcome::Applied { released }
    }

    /// Wait for the next patch on the inbox.
    pub async fn next_patch(&mut self) -> Option<RunPatch> {
        self.inbox.recv().await
    }

    /// Take a queued patch without waiting.
    pub fn try_next_patch(&mut self) -> Option<RunPatch> {
        self.inbox.try_recv().ok()
    }

    /// Release every subscription and discard queued patches.
    ///
    /// Returns the number of unsubscribe calls issued.
    pub fn teardown<R: WorkflowRunRepository>(&mut self, repo: &R) -> usize {
        let released = self.registry.release_all(repo);
        let mut discarded = 0usize;
        while self.inbox.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "discarded queued patches on teardown");
        }
        released
    }
}
