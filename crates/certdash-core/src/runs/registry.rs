//! Subscription bookkeeping for one list view.

use std::collections::HashSet;

use certdash_types::error::RepositoryError;
use certdash_types::run::RunId;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::repository::workflow_run::{RunInbox, WorkflowRunRepository};

/// Set of run ids this view holds a live subscription for.
///
/// Owned by exactly one view. Every id that enters the set is released
/// through [`release`](Self::release) or [`release_all`](Self::release_all),
/// and each release issues exactly one `unsubscribe` call.
pub struct SubscriptionRegistry {
    ids: HashSet<RunId>,
    inbox: RunInbox,
}

impl SubscriptionRegistry {
    pub fn new(inbox: RunInbox) -> Self {
        Self {
            ids: HashSet::new(),
            inbox,
        }
    }

    pub fn contains(&self, id: &RunId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RunId> {
        self.ids.iter()
    }

    /// Subscribe `id` unless it is already registered.
    ///
    /// Returns `Ok(false)` for a redundant call without touching the
    /// repository. On error nothing is registered.
    pub async fn subscribe<R: WorkflowRunRepository>(
        &mut self,
        repo: &R,
        id: &RunId,
    ) -> Result<bool, RepositoryError> {
        if self.ids.contains(id) {
            tracing::trace!(run_id = %id, "already subscribed");
            return Ok(false);
        }

        repo.subscribe(id, self.inbox.clone()).await?;
        self.ids.insert(id.clone());
        tracing::debug!(run_id = %id, "subscribed to run");
        Ok(true)
    }

    /// Subscribe every unregistered id in `ids` concurrently.
    ///
    /// Returns one outcome per attempted id; ids that were already
    /// registered are skipped. Firing `cancel` abandons the batch with
    /// [`RepositoryError::Aborted`]: nothing from it is registered and every
    /// attempted id is unsubscribed, since a request may have completed on
    /// the backend before the batch was dropped.
    pub async fn subscribe_all<R: WorkflowRunRepository>(
        &mut self,
        repo: &R,
        ids: &[RunId],
        cancel: &CancellationToken,
    ) -> Result<Vec<(RunId, Result<(), RepositoryError>)>, RepositoryError> {
        let mut pending: Vec<RunId> = Vec::new();
        for id in ids {
            if !self.ids.contains(id) && !pending.contains(id) {
                pending.push(id.clone());
            }
        }
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let inbox = &self.inbox;
        let attempts = join_all(pending.iter().map(|id| repo.subscribe(id, inbox.clone())));
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            results = attempts => Some(results),
        };

        let Some(results) = results else {
            for id in &pending {
                repo.unsubscribe(id);
            }
            tracing::debug!(count = pending.len(), "abandoned pending run subscriptions");
            return Err(RepositoryError::Aborted);
        };

        let mut outcomes = Vec::with_capacity(pending.len());
        for (id, result) in pending.into_iter().zip(results) {
            let outcome = result.map(|_| {
                self.ids.insert(id.clone());
                tracing::debug!(run_id = %id, "subscribed to run");
            });
            outcomes.push((id, outcome));
        }
        Ok(outcomes)
    }

    /// Unsubscribe `id` if registered. Returns whether a call was issued.
    pub fn release<R: WorkflowRunRepository>(&mut self, repo: &R, id: &RunId) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        repo.unsubscribe(id);
        tracing::debug!(run_id = %id, "unsubscribed from run");
        true
    }

    /// Unsubscribe every registered id. Returns the number of calls issued.
    pub fn release_all<R: WorkflowRunRepository>(&mut self, repo: &R) -> usize {
        let ids: Vec<RunId> = self.ids.drain().collect();
        for id in &ids {
            repo.unsubscribe(id);
        }
        if !ids.is_empty() {
            tracing::debug!(count = ids.len(), "released all run subscriptions");
        }
        ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRunRepository;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn redundant_subscribe_is_rejected_without_repository_call() {
        let repo = MockRunRepository::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new(tx);
        let id = RunId::from("r1");

        assert!(registry.subscribe(&repo, &id).await.unwrap());
        assert!(!registry.subscribe(&repo, &id).await.unwrap());

        assert_eq!(repo.subscribe_calls().len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_subscribe_registers_nothing() {
        let repo = MockRunRepository::default();
        repo.fail_subscribe("r1");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new(tx);

        let result = registry.subscribe(&repo, &RunId::from("r1")).await;
        assert!(matches!(result, Err(RepositoryError::Realtime(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn batch_subscribe_runs_requests_concurrently() {
        let repo = MockRunRepository::default();
        repo.delay_subscribe(200);
        repo.fail_subscribe("c");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new(tx);
        let ids: Vec<RunId> = ["a", "b", "c", "a"].into_iter().map(RunId::from).collect();

        let started = std::time::Instant::now();
        let outcomes = registry
            .subscribe_all(&repo, &ids, &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() < std::time::Duration::from_millis(500));
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().filter(|(_, r)| r.is_ok()).count() == 2);
        assert_eq!(repo.subscribe_calls().len(), 3);
        assert!(registry.contains(&RunId::from("a")));
        assert!(!registry.contains(&RunId::from("c")));
    }

    #[tokio::test]
    async fn cancelled_batch_registers_nothing_and_cleans_up() {
        let repo = MockRunRepository::default();
        repo.delay_subscribe(700);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new(tx);
        let ids: Vec<RunId> = ["a", "b"].into_iter().map(RunId::from).collect();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let result = registry.subscribe_all(&repo, &ids, &cancel).await;
        assert!(matches!(result, Err(RepositoryError::Aborted)));
        assert!(registry.is_empty());
        assert_eq!(repo.unsubscribe_count("a"), 1);
        assert_eq!(repo.unsubscribe_count("b"), 1);
        assert!(repo.live_ids().is_empty());
    }

    #[tokio::test]
    async fn release_is_issued_once_per_id() {
        let repo = MockRunRepository::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new(tx);
        let id = RunId::from("r1");

        registry.subscribe(&repo, &id).await.unwrap();
        assert!(registry.release(&repo, &id));
        assert!(!registry.release(&repo, &id));

        assert_eq!(repo.unsubscribe_count("r1"), 1);
    }

    #[tokio::test]
    async fn release_all_unsubscribes_every_id() {
        let repo = MockRunRepository::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = SubscriptionRegistry::new(tx);

        for id in ["a", "b", "c"] {
            registry.subscribe(&repo, &RunId::from(id)).await.unwrap();
        }

        assert_eq!(registry.release_all(&repo), 3);
        assert_eq!(registry.release_all(&repo), 0);
        assert_eq!(repo.unsubscribe_calls().len(), 3);
        assert!(repo.live_ids().is_empty());
    }
}
