//! Repository trait definitions (ports).
//!
//! These traits define the backend interface that the infrastructure layer
//! (certdash-infra) implements. The core crate never depends on any specific
//! transport.

pub mod statistics;
pub mod workflow_run;
