//! Conflict resolution over the merge engine

use crate::document::DocumentId;
use crate::merge::merge_text;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Everything the merge engine needs to reconcile one divergence.
/// Ephemeral: built when a sync reports a conflict, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub document_id: DocumentId,
    pub base_content: String,
    pub local_content: String,
    pub remote_content: String,
    pub local_timestamp: u64,
    pub remote_timestamp: u64,
}

/// Explicit caller decision when auto-merge fails
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    Manual(String),
}

impl Resolution {
    /// The content this decision selects
    pub fn into_content(self, conflict: &ConflictInfo) -> String {
        match self {
            Resolution::KeepLocal => conflict.local_content.clone(),
            Resolution::KeepRemote => conflict.remote_content.clone(),
            Resolution::Manual(content) => content,
        }
    }
}

/// Decides auto-merge vs. unresolved conflict
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Attempt a three-way auto-merge. `None` means a genuine overlapping
    /// conflict that the caller must resolve by explicit choice; it is
    /// never silently resolved here.
    pub fn attempt_auto_merge(&self, conflict: &ConflictInfo) -> Option<String> {
        let result = merge_text(
            &conflict.base_content,
            &conflict.local_content,
            &conflict.remote_content,
        );

        if result.is_none() {
            debug!(doc_id = %conflict.document_id, "Auto-merge failed, manual resolution required");
        }

        result
    }
}
