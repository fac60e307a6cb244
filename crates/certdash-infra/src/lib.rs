//! Infrastructure implementations for certdash.
//!
//! Implements the repository trait from `certdash-core` against a PocketBase
//! backend (REST for queries and actions, SSE for realtime updates) and loads
//! process-wide configuration from the data directory.

pub mod config;
pub mod pocketbase;
