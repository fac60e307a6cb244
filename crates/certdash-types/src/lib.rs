//! Shared domain types for certdash.
//!
//! Workflow runs as the backend reports them, the realtime patch envelope,
//! list query/page shapes, dashboard statistics, error enums and
//! process-wide configuration.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod run;
pub mod statistics;
