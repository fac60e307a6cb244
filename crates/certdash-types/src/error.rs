use thiserror::Error;

use crate::run::{RunId, WorkflowRunStatus};

/// Errors from repository operations (used by trait definitions in certdash-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The request was cancelled by its caller (e.g. the view navigated away).
    #[error("request aborted")]
    Aborted,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("entity not found")]
    NotFound,
}

impl RepositoryError {
    /// Aborts are expected during teardown and are never shown to the user.
    pub fn is_abort(&self) -> bool {
        matches!(self, RepositoryError::Aborted)
    }
}

/// Errors from user-initiated actions on runs in a list view.
#[derive(Debug, Error)]
pub enum RunActionError {
    #[error("run {id} is {status} and can no longer be canceled")]
    NotCancellable { id: RunId, status: WorkflowRunStatus },

    #[error("run {id} is {status} and cannot be deleted until it finishes")]
    NotDeletable { id: RunId, status: WorkflowRunStatus },

    #[error("run {0} is not on the current page")]
    NotOnPage(RunId),

    #[error("no finished runs selected")]
    NothingToDelete,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
