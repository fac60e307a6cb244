//! Workflow run types.
//!
//! A [`WorkflowRun`] is one execution of a configured certificate workflow,
//! serialized the way the backend stores it in the `workflow_run` collection
//! (camelCase fields, PocketBase datetime strings, empty strings for unset
//! values).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Name of the backend collection holding workflow runs.
pub const COLLECTION_WORKFLOW_RUN: &str = "workflow_run";

/// Opaque identifier of a workflow run, assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow run.
///
/// `Pending` and `Processing` are in flight; the other three are terminal and
/// never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowRunStatus {
    Pending,
    /// Older backends stored this state as `running`.
    #[serde(alias = "running")]
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl WorkflowRunStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(self, WorkflowRunStatus::Pending | WorkflowRunStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_in_flight()
    }

    /// Whether a record in this status may be replaced by one in `next`.
    ///
    /// Repeating the same status is allowed (field updates without a status
    /// change). Terminal states accept nothing but themselves.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (WorkflowRunStatus::Pending, _)
                | (WorkflowRunStatus::Processing, WorkflowRunStatus::Succeeded)
                | (WorkflowRunStatus::Processing, WorkflowRunStatus::Failed)
                | (WorkflowRunStatus::Processing, WorkflowRunStatus::Canceled)
        )
    }
}

impl fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowRunStatus::Pending => write!(f, "pending"),
            WorkflowRunStatus::Processing => write!(f, "processing"),
            WorkflowRunStatus::Succeeded => write!(f, "succeeded"),
            WorkflowRunStatus::Failed => write!(f, "failed"),
            WorkflowRunStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for WorkflowRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(WorkflowRunStatus::Pending),
            "processing" | "running" => Ok(WorkflowRunStatus::Processing),
            "succeeded" => Ok(WorkflowRunStatus::Succeeded),
            "failed" => Ok(WorkflowRunStatus::Failed),
            "canceled" => Ok(WorkflowRunStatus::Canceled),
            other => Err(format!("invalid workflow run status: '{other}'")),
        }
    }
}

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowTrigger {
    /// Started by the workflow's cron schedule (stored as `auto` before 0.4).
    #[serde(alias = "auto")]
    Scheduled,
    Manual,
}

impl fmt::Display for WorkflowTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowTrigger::Scheduled => write!(f, "scheduled"),
            WorkflowTrigger::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for WorkflowTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" | "auto" => Ok(WorkflowTrigger::Scheduled),
            "manual" => Ok(WorkflowTrigger::Manual),
            other => Err(format!("invalid workflow trigger: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow Run
// ---------------------------------------------------------------------------

/// One execution instance of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: RunId,
    /// ID of the owning workflow.
    #[serde(rename = "workflowRef", default)]
    pub workflow_id: String,
    pub status: WorkflowRunStatus,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub trigger: Option<WorkflowTrigger>,
    #[serde(default, with = "pb_datetime")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "pb_datetime")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Snapshot of the workflow graph as executed, including node outputs.
    #[serde(default)]
    pub graph: serde_json::Value,
    /// Failure message; empty unless the run failed.
    #[serde(default)]
    pub error: String,
    #[serde(default, with = "pb_datetime")]
    pub created: Option<DateTime<Utc>>,
    /// Last backend write. Used to order snapshots against realtime patches.
    #[serde(default, with = "pb_datetime")]
    pub updated: Option<DateTime<Utc>>,
    /// Related records, present only when the list query asked for them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<RunExpand>,
}

/// Relations expanded alongside a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunExpand {
    #[serde(rename = "workflowRef", default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowSummary>,
}

/// The few workflow fields a run listing shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl WorkflowRun {
    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    /// True when `self` carries a strictly newer `updated` stamp than `other`.
    ///
    /// Records without a stamp are never considered newer.
    pub fn is_newer_than(&self, other: &WorkflowRun) -> bool {
        match (self.updated, other.updated) {
            (Some(mine), Some(theirs)) => mine > theirs,
            _ => false,
        }
    }

    /// Whether `incoming` may replace this record.
    ///
    /// Rejects status regressions out of a terminal state and records whose
    /// `updated` stamp is older than ours.
    pub fn accepts(&self, incoming: &WorkflowRun) -> bool {
        self.status.can_transition_to(incoming.status) && !self.is_newer_than(incoming)
    }

    /// Name of the owning workflow, when it was expanded and is non-empty.
    pub fn workflow_name(&self) -> Option<&str> {
        self.expand
            .as_ref()
            .and_then(|expand| expand.workflow.as_ref())
            .map(|workflow| workflow.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Kind of change carried by a realtime message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeAction {
    Create,
    Update,
    Delete,
}

/// A realtime message for one run: the full record after the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPatch {
    pub action: RealtimeAction,
    pub record: WorkflowRun,
}

impl RunPatch {
    pub fn update(record: WorkflowRun) -> Self {
        Self {
            action: RealtimeAction::Update,
            record,
        }
    }
}

// ---------------------------------------------------------------------------
// List queries
// ---------------------------------------------------------------------------

/// Paged query over workflow runs, optionally scoped to one workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunListQuery {
    pub workflow_id: Option<String>,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
    /// Ask the backend to expand each run's workflow.
    pub expand: bool,
}

impl RunListQuery {
    pub fn new(workflow_id: Option<String>, page: u32, per_page: u32) -> Self {
        Self {
            workflow_id,
            page: page.max(1),
            per_page: per_page.max(1),
            expand: false,
        }
    }

    pub fn with_expand(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }
}

/// One page of runs plus the total count across all pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPage {
    pub items: Vec<WorkflowRun>,
    pub total_items: u64,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// PocketBase datetime layout, e.g. `2025-01-02 03:04:05.678Z`.
pub const PB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Parse a backend timestamp. Accepts the PocketBase layout and RFC 3339.
pub fn parse_pb_datetime(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.fZ").map(|naive| naive.and_utc())
}

/// (De)serialize `Option<DateTime<Utc>>` as a PocketBase datetime string,
/// with the empty string standing for `None`.
pub mod pb_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{PB_DATETIME_FORMAT, parse_pb_datetime};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(PB_DATETIME_FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_pb_datetime(s)
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid datetime '{s}': {e}"))),
        }
    }
}

fn empty_string_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
