//! Workflow run repository trait definition.
//!
//! Defines the backend interface for listing, removing and canceling runs and
//! for per-run realtime subscriptions. The infrastructure layer
//! (certdash-infra) implements this trait over the PocketBase REST and
//! realtime APIs.

use certdash_types::error::RepositoryError;
use certdash_types::run::{RunId, RunListQuery, RunPage, RunPatch};
use tokio::sync::mpsc;

/// Per-view inbox that realtime deliveries are pushed onto.
pub type RunInbox = mpsc::UnboundedSender<RunPatch>;

/// Repository trait for workflow runs.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRunRepository: Send + Sync {
    /// Fetch one page of runs, newest first, optionally scoped to a workflow.
    ///
    /// Dropping the returned future aborts the request.
    fn list(
        &self,
        query: &RunListQuery,
    ) -> impl std::future::Future<Output = Result<RunPage, RepositoryError>> + Send;

    /// Delete one or more runs. Returns `true` when the backend accepted the
    /// deletion. The backend refuses to delete runs that are still in flight.
    fn remove(
        &self,
        ids: &[RunId],
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Ask the backend to cancel an in-flight run.
    fn cancel(
        &self,
        workflow_id: &str,
        run_id: &RunId,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Start delivering realtime patches for `run_id` onto `inbox`.
    ///
    /// At most one delivery is registered per id: a second call while the id
    /// is already subscribed is rejected as redundant and returns `Ok(false)`.
    /// Handshake failures are returned to the caller.
    fn subscribe(
        &self,
        run_id: &RunId,
        inbox: RunInbox,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Stop delivering patches for `run_id`.
    ///
    /// Takes effect locally before returning, so no delivery for `run_id`
    /// happens afterwards. Unknown ids are a no-op.
    fn unsubscribe(&self, run_id: &RunId);
}
