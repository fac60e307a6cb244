//! PocketBase backend adapters.
//!
//! [`PocketBaseClient`] wraps the REST API, [`RealtimeHub`] multiplexes the
//! single SSE realtime connection, and [`PocketBaseWorkflowRunRepository`]
//! combines both behind the `WorkflowRunRepository` port.
//! [`PocketBaseStatisticsRepository`] serves the dashboard counters.

pub mod client;
pub mod realtime;
pub mod statistics;
pub mod types;
pub mod workflow_run;

pub use client::PocketBaseClient;
pub use realtime::{ListenerId, RealtimeHub};
pub use statistics::PocketBaseStatisticsRepository;
pub use workflow_run::PocketBaseWorkflowRunRepository;
