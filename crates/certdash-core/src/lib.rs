//! Run list logic and repository trait definitions for certdash.
//!
//! This crate defines the "ports" (repository and notifier traits) that the
//! infrastructure layer implements, the list view-model and realtime
//! reconciler that keep a page of workflow runs current, and the dashboard
//! overview. It depends only on `certdash-types` -- never on
//! `certdash-infra` or any HTTP crate.

pub mod dashboard;
pub mod notify;
pub mod repository;
pub mod runs;

#[cfg(test)]
pub(crate) mod testing;
