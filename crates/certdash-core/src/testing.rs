//! In-memory repository and notifier doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};

use certdash_types::error::RepositoryError;
use certdash_types::run::{
    RealtimeAction, RunId, RunListQuery, RunPage, RunPatch, WorkflowRun, WorkflowRunStatus,
    WorkflowTrigger,
};
use certdash_types::statistics::Statistics;

use crate::notify::Notifier;
use crate::repository::statistics::StatisticsRepository;
use crate::repository::workflow_run::{RunInbox, WorkflowRunRepository};

pub fn stamp(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
}

pub fn run(id: &str, status: WorkflowRunStatus) -> WorkflowRun {
    run_at(id, status, 0)
}

pub fn run_at(id: &str, status: WorkflowRunStatus, updated: i64) -> WorkflowRun {
    WorkflowRun {
        id: RunId::from(id),
        workflow_id: "wf1".to_string(),
        status,
        trigger: Some(WorkflowTrigger::Manual),
        started_at: Some(stamp(0)),
        ended_at: status.is_terminal().then(|| stamp(updated)),
        graph: serde_json::json!({"nodes": []}),
        error: String::new(),
        created: Some(stamp(0)),
        updated: Some(stamp(updated)),
        expand: None,
    }
}

#[derive(Default)]
struct MockState {
    runs: Vec<WorkflowRun>,
    inboxes: HashMap<RunId, RunInbox>,
    subscribe_calls: Vec<RunId>,
    unsubscribe_calls: Vec<RunId>,
    remove_calls: Vec<Vec<RunId>>,
    cancel_calls: Vec<RunId>,
    list_calls: usize,
    list_error: Option<String>,
    failing_subscriptions: HashSet<RunId>,
    list_delay_ms: u64,
    subscribe_delay_ms: u64,
}

/// Backend double with call accounting.
#[derive(Default)]
pub struct MockRunRepository {
    state: Mutex<MockState>,
}

impl MockRunRepository {
    pub fn with_runs(runs: Vec<WorkflowRun>) -> Self {
        let repo = Self::default();
        repo.state.lock().unwrap().runs = runs;
        repo
    }

    /// Replace a stored run, as if the backend had updated it.
    pub fn store(&self, record: WorkflowRun) {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.runs.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        }
    }

    /// Deliver a patch the way the realtime transport would.
    pub fn push(&self, record: WorkflowRun) -> bool {
        self.push_action(RealtimeAction::Update, record)
    }

    pub fn push_action(&self, action: RealtimeAction, record: WorkflowRun) -> bool {
        let state = self.state.lock().unwrap();
        match state.inboxes.get(&record.id) {
            Some(inbox) => inbox.send(RunPatch { action, record }).is_ok(),
            None => false,
        }
    }

    pub fn fail_list(&self, message: Option<&str>) {
        self.state.lock().unwrap().list_error = message.map(str::to_string);
    }

    pub fn fail_subscribe(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_subscriptions
            .insert(RunId::from(id));
    }

    pub fn delay_list(&self, millis: u64) {
        self.state.lock().unwrap().list_delay_ms = millis;
    }

    /// Make every subscribe take `millis` before it answers.
    pub fn delay_subscribe(&self, millis: u64) {
        self.state.lock().unwrap().subscribe_delay_ms = millis;
    }

    pub fn live_ids(&self) -> HashSet<RunId> {
        self.state.lock().unwrap().inboxes.keys().cloned().collect()
    }

    pub fn subscribe_calls(&self) -> Vec<RunId> {
        self.state.lock().unwrap().subscribe_calls.clone()
    }

    pub fn unsubscribe_calls(&self) -> Vec<RunId> {
        self.state.lock().unwrap().unsubscribe_calls.clone()
    }

    pub fn unsubscribe_count(&self, id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .unsubscribe_calls
            .iter()
            .filter(|r| r.as_str() == id)
            .count()
    }

    pub fn remove_calls(&self) -> Vec<Vec<RunId>> {
        self.state.lock().unwrap().remove_calls.clone()
    }

    pub fn cancel_calls(&self) -> Vec<RunId> {
        self.state.lock().unwrap().cancel_calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

impl WorkflowRunRepository for MockRunRepository {
    async fn list(&self, query: &RunListQuery) -> Result<RunPage, RepositoryError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.list_calls += 1;
            state.list_delay_ms
        };
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        let state = self.state.lock().unwrap();
        if let Some(message) = &state.list_error {
            return Err(RepositoryError::Transport(message.clone()));
        }

        let matching: Vec<WorkflowRun> = state
            .runs
            .iter()
            .filter(|r| {
                query
                    .workflow_id
                    .as_deref()
                    .is_none_or(|wf| r.workflow_id == wf)
            })
            .cloned()
            .collect();
        let start = ((query.page - 1) * query.per_page) as usize;
        let items = matching
            .iter()
            .skip(start)
            .take(query.per_page as usize)
            .cloned()
            .collect();

        Ok(RunPage {
            items,
            total_items: matching.len() as u64,
        })
    }

    async fn remove(&self, ids: &[RunId]) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.remove_calls.push(ids.to_vec());
        if state
            .runs
            .iter()
            .any(|r| ids.contains(&r.id) && r.is_in_flight())
        {
            return Err(RepositoryError::Api {
                status: 400,
                message: "cannot delete an unfinished run".to_string(),
            });
        }
        state.runs.retain(|r| !ids.contains(&r.id));
        Ok(true)
    }

    async fn cancel(&self, _workflow_id: &str, run_id: &RunId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.cancel_calls.push(run_id.clone());
        match state.runs.iter_mut().find(|r| &r.id == run_id) {
            Some(run) => {
                run.status = WorkflowRunStatus::Canceled;
                run.updated = run.updated.map(|t| t + Duration::seconds(1));
                Ok(true)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn subscribe(&self, run_id: &RunId, inbox: RunInbox) -> Result<bool, RepositoryError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.subscribe_calls.push(run_id.clone());
            state.subscribe_delay_ms
        };
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.failing_subscriptions.contains(run_id) {
            return Err(RepositoryError::Realtime("handshake timed out".to_string()));
        }
        if state.inboxes.contains_key(run_id) {
            return Ok(false);
        }
        state.inboxes.insert(run_id.clone(), inbox);
        Ok(true)
    }

    fn unsubscribe(&self, run_id: &RunId) {
        let mut state = self.state.lock().unwrap();
        state.unsubscribe_calls.push(run_id.clone());
        state.inboxes.remove(run_id);
    }
}

/// Statistics source with a fixed answer.
pub struct MockStatistics {
    result: Result<Statistics, String>,
}

impl MockStatistics {
    pub fn returning(statistics: Statistics) -> Self {
        Self {
            result: Ok(statistics),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

impl StatisticsRepository for MockStatistics {
    async fn get(&self) -> Result<Statistics, RepositoryError> {
        self.result.clone().map_err(RepositoryError::Transport)
    }
}

/// Notifier that records every error it is given.
#[derive(Default)]
pub struct RecordingNotifier {
    errors: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str, description: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((message.to_string(), description.to_string()));
    }
}
