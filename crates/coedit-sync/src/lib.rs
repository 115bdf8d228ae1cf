//! Coedit Sync - client-side coordination
//!
//! Debounces local edits, drives the repository's sync path, auto-merges
//! divergence where the merge engine allows it, and surfaces genuine
//! conflicts for an explicit decision.

pub mod coordinator;

pub use coordinator::{SyncCoordinator, SyncStatus};
