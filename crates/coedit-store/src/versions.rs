//! Append-only version ledger with bounded retention

use crate::StorageAdapter;
use coedit_core::{DocumentId, DocumentVersion, Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Default number of versions retained per document
pub const DEFAULT_MAX_VERSIONS: usize = 50;

/// Per-document version ledger.
///
/// Version numbers are always derived from persisted rows (`max + 1`), not
/// from a separate counter, so numbering stays monotonic and gap-free for
/// future writes even if a crash lands between creation and cleanup.
pub struct VersionStore {
    adapter: Arc<dyn StorageAdapter>,
}

impl VersionStore {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }

    /// Append a new version, numbered `max(existing) + 1`
    pub async fn create_version(
        &self,
        document_id: &DocumentId,
        content: &str,
    ) -> Result<DocumentVersion> {
        let next = self.max_version_number(document_id).await? + 1;
        let version = DocumentVersion::new(document_id.clone(), content, next);

        self.adapter.insert_version(&version).await?;
        debug!(doc_id = %document_id, version = next, "Version created");

        Ok(version)
    }

    /// Highest version number for a document, 0 if none exist
    pub async fn max_version_number(&self, document_id: &DocumentId) -> Result<u64> {
        Ok(self.adapter.max_version_number(document_id).await?)
    }

    /// All versions of a document, newest first
    pub async fn versions_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<DocumentVersion>> {
        Ok(self.adapter.versions_for_document(document_id).await?)
    }

    /// Load a single version by id
    pub async fn find_version(&self, id: &str) -> Result<DocumentVersion> {
        self.adapter
            .fetch_version(id)
            .await?
            .ok_or_else(|| Error::VersionNotFound(id.to_string()))
    }

    /// Delete every version except the `max_versions` most recent by
    /// version number. Returns the number of versions removed.
    pub async fn cleanup_old_versions(
        &self,
        document_id: &DocumentId,
        max_versions: usize,
    ) -> Result<usize> {
        let versions = self.adapter.versions_for_document(document_id).await?;

        if versions.len() <= max_versions {
            return Ok(0);
        }

        // versions is newest first, so the last kept entry defines the cutoff
        let cutoff = match max_versions {
            0 => versions[0].version_number + 1,
            n => versions[n - 1].version_number,
        };

        let removed = self
            .adapter
            .prune_versions_below(document_id, cutoff)
            .await?;
        debug!(doc_id = %document_id, removed = removed, "Old versions pruned");

        Ok(removed)
    }

    /// Delete all versions of a document (delete cascade)
    pub async fn remove_all(&self, document_id: &DocumentId) -> Result<usize> {
        Ok(self
            .adapter
            .remove_versions_for_document(document_id)
            .await?)
    }
}
