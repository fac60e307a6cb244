//! Detail view for a single run.

use certdash_types::run::{RunId, WorkflowRun};

/// Shows one run in full, kept in sync with the list's realtime patches.
///
/// Holds no subscription of its own; the list view merges patches into it.
/// Opening or closing it never changes what the list is subscribed to.
#[derive(Debug, Default)]
pub struct DetailOverlay {
    current: Option<WorkflowRun>,
}

impl DetailOverlay {
    pub fn open(&mut self, snapshot: WorkflowRun) {
        tracing::debug!(run_id = %snapshot.id, "opened run detail");
        self.current = Some(snapshot);
    }

    pub fn close(&mut self) -> Option<WorkflowRun> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&WorkflowRun> {
        self.current.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_showing(&self, id: &RunId) -> bool {
        self.current.as_ref().is_some_and(|run| &run.id == id)
    }

    /// Merge `record` into the open snapshot if it is the same run.
    ///
    /// Returns whether the snapshot changed. Stale or regressive records are
    /// ignored with the same rule the list uses.
    pub fn merge(&mut self, record: &WorkflowRun) -> bool {
        match self.current.as_mut() {
            Some(current) if current.id == record.id && current.accepts(record) => {
                *current = record.clone();
                true
            }
            _ => false,
        }
    }
}
