//! PocketBase implementation of [`WorkflowRunRepository`].
//!
//! Each repository handle has its own realtime listener id, so one handle
//! serves one view. Handles share the process-wide [`RealtimeHub`].

use std::sync::Arc;

use reqwest::Method;

use certdash_core::repository::workflow_run::{RunInbox, WorkflowRunRepository};
use certdash_types::error::RepositoryError;
use certdash_types::run::{
    COLLECTION_WORKFLOW_RUN, RunId, RunListQuery, RunPage, RunPatch, WorkflowRun,
};

use super::client::PocketBaseClient;
use super::realtime::{ListenerId, RealtimeHub};
use super::types::{ListParams, ListResponse, filter_eq};

pub struct PocketBaseWorkflowRunRepository {
    client: Arc<PocketBaseClient>,
    hub: Arc<RealtimeHub<RunPatch>>,
    listener: ListenerId,
}

impl PocketBaseWorkflowRunRepository {
    pub fn new(client: Arc<PocketBaseClient>, hub: Arc<RealtimeHub<RunPatch>>) -> Self {
        let listener = hub.listener();
        Self {
            client,
            hub,
            listener,
        }
    }

    /// Fetch a single run by id.
    pub async fn get(&self, id: &RunId) -> Result<WorkflowRun, RepositoryError> {
        self.client
            .get_record(COLLECTION_WORKFLOW_RUN, id.as_str())
            .await
    }
}

/// Relation field linking a run to its workflow.
const WORKFLOW_FIELD: &str = "workflowRef";

/// Realtime topic for one run record.
pub fn run_topic(id: &RunId) -> String {
    format!("{COLLECTION_WORKFLOW_RUN}/{id}")
}

/// List parameters for a page query, newest first.
pub fn list_params(query: &RunListQuery) -> ListParams {
    let mut params = ListParams::new(query.page, query.per_page).sort("-created");
    if let Some(workflow_id) = &query.workflow_id {
        params = params.filter(filter_eq(WORKFLOW_FIELD, workflow_id));
    }
    if query.expand {
        params = params.expand(WORKFLOW_FIELD);
    }
    params
}

/// Path of the cancel endpoint for one run.
pub fn cancel_path(workflow_id: &str, run_id: &RunId) -> String {
    format!("/api/workflows/{workflow_id}/runs/{run_id}/cancel")
}

impl WorkflowRunRepository for PocketBaseWorkflowRunRepository {
    async fn list(&self, query: &RunListQuery) -> Result<RunPage, RepositoryError> {
        let response: ListResponse<WorkflowRun> = self
            .client
            .list_records(COLLECTION_WORKFLOW_RUN, &list_params(query))
            .await?;
        Ok(RunPage {
            items: response.items,
            total_items: response.total_items,
        })
    }

    async fn remove(&self, ids: &[RunId]) -> Result<bool, RepositoryError> {
        match ids {
            [] => Ok(false),
            [id] => {
                self.client
                    .delete_record(COLLECTION_WORKFLOW_RUN, id.as_str())
                    .await?;
                Ok(true)
            }
            many => {
                let ids: Vec<&str> = many.iter().map(RunId::as_str).collect();
                self.client
                    .delete_records(COLLECTION_WORKFLOW_RUN, &ids)
                    .await?;
                Ok(true)
            }
        }
    }

    async fn cancel(&self, workflow_id: &str, run_id: &RunId) -> Result<bool, RepositoryError> {
        tracing::info!(workflow_id, run_id = %run_id, "requesting run cancellation");
        self.client
            .send_empty(
                self.client
                    .request(Method::POST, &cancel_path(workflow_id, run_id)),
            )
            .await?;
        Ok(true)
    }

    async fn subscribe(&self, run_id: &RunId, inbox: RunInbox) -> Result<bool, RepositoryError> {
        self.hub
            .subscribe(&run_topic(run_id), self.listener, inbox)
            .await
    }

    fn unsubscribe(&self, run_id: &RunId) {
        self.hub.unsubscribe(&run_topic(run_id), self.listener);
    }
}
