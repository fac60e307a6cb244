//! Workflow run list: page state, realtime reconciliation and detail view.
//!
//! A [`RunListViewModel`] owns one page of runs. Its [`Reconciler`] keeps a
//! live subscription for every pending/processing row and merges patches from
//! the view's inbox into the page and the [`DetailOverlay`]. A
//! [`RunListSession`] drives all of it from a single task.

pub mod detail;
pub mod reconciler;
pub mod registry;
pub mod session;
pub mod view_model;

pub use detail::DetailOverlay;
pub use reconciler::{IgnoreReason, PatchOutcome, Reconciler, SyncReport};
pub use registry::SubscriptionRegistry;
pub use session::{RunListSession, SessionEvent, ViewCommand};
pub use view_model::RunListViewModel;
