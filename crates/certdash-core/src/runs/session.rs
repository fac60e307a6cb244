//! Single-task event loop driving a [`RunListViewModel`].
//!
//! UI commands and realtime patches both arrive as messages and are handled
//! one at a time on the session task, so the view-model is never shared.
//! Shutdown aborts any in-flight request and tears the view down before
//! [`RunListSession::run`] returns.

use certdash_types::error::RunActionError;
use certdash_types::run::RunId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::view_model::RunListViewModel;
use crate::repository::workflow_run::WorkflowRunRepository;

/// Commands a user interface sends to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    Refresh,
    SetPage { page: u32, per_page: u32 },
    SetWorkflow(Option<String>),
    Select(Vec<RunId>),
    Toggle(RunId),
    ClearSelection,
    Cancel(RunId),
    Delete(RunId),
    DeleteSelected,
    OpenDetail(RunId),
    CloseDetail,
}

/// Why the view was re-rendered.
#[derive(Debug)]
pub enum SessionEvent<'a> {
    Loaded,
    Command(&'a ViewCommand),
    /// An action was rejected or failed. Request failures have already been
    /// sent to the notifier; validation failures have not.
    Rejected(&'a RunActionError),
    Patched(&'a RunId),
}

/// Owns a view-model and processes its commands and patches in order.
pub struct RunListSession<R: WorkflowRunRepository> {
    view: RunListViewModel<R>,
    commands: mpsc::Receiver<ViewCommand>,
    shutdown: CancellationToken,
}

impl<R: WorkflowRunRepository> RunListSession<R> {
    /// Create a session and the sender used to drive it.
    pub fn new(
        view: RunListViewModel<R>,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Sender<ViewCommand>) {
        let (tx, rx) = mpsc::channel(32);
        (
            Self {
                view,
                commands: rx,
                shutdown,
            },
            tx,
        )
    }

    /// Run until `shutdown` fires or every command sender is dropped.
    ///
    /// `render` is called after the initial load and after every change.
    /// Returns the torn-down view-model.
    pub async fn run<F>(mut self, mut render: F) -> RunListViewModel<R>
    where
        F: FnMut(&RunListViewModel<R>, SessionEvent<'_>),
    {
        self.view.load(&self.shutdown).await;
        render(&self.view, SessionEvent::Loaded);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    match self.handle(&command).await {
                        Ok(()) => render(&self.view, SessionEvent::Command(&command)),
                        Err(err) => render(&self.view, SessionEvent::Rejected(&err)),
                    }
                }
                patch = self.view.next_patch() => {
                    let Some(patch) = patch else { break };
                    let id = patch.record.id.clone();
                    if self.view.apply_patch(patch).changed() {
                        render(&self.view, SessionEvent::Patched(&id));
                    }
                }
            }
        }

        let released = self.view.teardown();
        tracing::debug!(released, "run list session stopped");
        self.view
    }

    async fn handle(&mut self, command: &ViewCommand) -> Result<(), RunActionError> {
        let cancel = &self.shutdown;
        match command {
            ViewCommand::Refresh => {
                self.view.load(cancel).await;
            }
            ViewCommand::SetPage { page, per_page } => {
                self.view.set_page(*page, *per_page, cancel).await;
            }
            ViewCommand::SetWorkflow(workflow_id) => {
                self.view.set_workflow(workflow_id.clone(), cancel).await;
            }
            ViewCommand::Select(ids) => self.view.select(ids.iter().cloned()),
            ViewCommand::Toggle(id) => {
                self.view.toggle(id);
            }
            ViewCommand::ClearSelection => self.view.clear_selection(),
            ViewCommand::Cancel(id) => {
                self.view.cancel_run(id, cancel).await?;
            }
            ViewCommand::Delete(id) => {
                self.view.delete_run(id, cancel).await?;
            }
            ViewCommand::DeleteSelected => {
                self.view.delete_selected(cancel).await?;
            }
            ViewCommand::OpenDetail(id) => {
                if !self.view.open_detail(id) {
                    return Err(RunActionError::NotOnPage(id.clone()));
                }
            }
            ViewCommand::CloseDetail => {
                self.view.close_detail();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::testing::{MockRunRepository, RecordingNotifier, run, run_at};
    use certdash_types::run::RunListQuery;
    use certdash_types::run::WorkflowRunStatus::*;

    fn session(
        repo: Arc<MockRunRepository>,
        shutdown: CancellationToken,
    ) -> (RunListSession<MockRunRepository>, mpsc::Sender<ViewCommand>) {
        let view = RunListViewModel::new(
            repo,
            Arc::new(RecordingNotifier::default()),
            RunListQuery::new(None, 1, 10),
        );
        RunListSession::new(view, shutdown)
    }

    async fn wait_for_subscription(repo: &MockRunRepository, id: &str) {
        for _ in 0..100 {
            if repo.live_ids().contains(&RunId::from(id)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run {id} was never subscribed");
    }

    #[tokio::test]
    async fn session_applies_patches_and_tears_down_on_shutdown() {
        let repo = Arc::new(MockRunRepository::with_runs(vec![
            run("r1", Pending),
            run("r2", Processing),
        ]));
        let shutdown = CancellationToken::new();
        let (session, _tx) = session(repo.clone(), shutdown.clone());

        let task = tokio::spawn(async move {
            let mut patched = Vec::new();
            let view = session
                .run(|_, event| {
                    if let SessionEvent::Patched(id) = event {
                        patched.push(id.clone());
                    }
                })
                .await;
            (view.subscription_count(), view.rows().to_vec(), patched)
        });

        wait_for_subscription(&repo, "r1").await;
        repo.push(run_at("r1", Succeeded, 1));
        for _ in 0..100 {
            if repo.unsubscribe_count("r1") == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();

        let (remaining, rows, patched) = task.await.unwrap();
        assert_eq!(remaining, 0);
        assert_eq!(rows[0].status, Succeeded);
        assert_eq!(patched, vec![RunId::from("r1")]);
        assert_eq!(repo.unsubscribe_count("r1"), 1);
        assert_eq!(repo.unsubscribe_count("r2"), 1);
    }

    #[tokio::test]
    async fn session_reports_rejected_commands() {
        let repo = Arc::new(MockRunRepository::with_runs(vec![run("r1", Succeeded)]));
        let shutdown = CancellationToken::new();
        let (session, tx) = session(repo.clone(), shutdown.clone());

        tx.send(ViewCommand::Cancel(RunId::from("r1"))).await.unwrap();
        tx.send(ViewCommand::OpenDetail(RunId::from("r1"))).await.unwrap();
        drop(tx);

        let mut rejected = 0;
        let mut opened = false;
        let view = session
            .run(|view, event| match event {
                SessionEvent::Rejected(RunActionError::NotCancellable { .. }) => rejected += 1,
                SessionEvent::Command(ViewCommand::OpenDetail(_)) => {
                    opened = view.detail().is_open();
                }
                _ => {}
            })
            .await;

        assert_eq!(rejected, 1);
        assert!(opened);
        assert!(repo.cancel_calls().is_empty());
        assert_eq!(view.subscription_count(), 0);
    }
}
