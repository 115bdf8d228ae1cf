//! Document repository - optimistic-concurrency write paths
//!
//! The repository holds no per-document lock between requests. Correctness
//! under concurrent writers rests entirely on the adapter's atomic
//! compare-and-swap (`StorageAdapter::replace_document`); see the trait
//! contract in `lib.rs`.

use crate::versions::{VersionStore, DEFAULT_MAX_VERSIONS};
use crate::{CasOutcome, StorageAdapter};
use coedit_core::{Document, DocumentId, DocumentPatch, Error, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Durable change notification published after every successful
/// content-changing write
#[derive(Debug, Clone)]
pub enum DocumentChange {
    Updated {
        document_id: DocumentId,
        etag: String,
        updated_at: u64,
        user_id: String,
    },
    Deleted {
        document_id: DocumentId,
    },
}

/// Conflict payload returned by `sync` on an etag mismatch
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConflict {
    pub server_content: String,
    pub server_etag: String,
    pub server_timestamp: u64,
}

/// Result of a `sync` call
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Success { document: Document },
    Conflict(SyncConflict),
}

/// Document CRUD plus etag-guarded write paths over a storage adapter
pub struct DocumentRepository {
    adapter: Arc<dyn StorageAdapter>,
    versions: VersionStore,
    max_versions: usize,
    change_tx: broadcast::Sender<DocumentChange>,
}

impl DocumentRepository {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self::with_max_versions(adapter, DEFAULT_MAX_VERSIONS)
    }

    pub fn with_max_versions(adapter: Arc<dyn StorageAdapter>, max_versions: usize) -> Self {
        let (change_tx, _) = broadcast::channel(1024);

        Self {
            versions: VersionStore::new(adapter.clone()),
            adapter,
            max_versions,
            change_tx,
        }
    }

    /// The version ledger backing this repository
    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    /// Subscribe to durable change notifications
    pub fn subscribe_changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.change_tx.subscribe()
    }

    /// Create a document on first save. Non-empty initial content counts as
    /// the first content write and is recorded as version 1.
    pub async fn create(
        &self,
        owner_id: &str,
        title: &str,
        content: &str,
        language: &str,
    ) -> Result<Document> {
        let doc = Document::new(DocumentId::random(), owner_id, title, content, language);
        self.adapter.insert_document(&doc).await?;

        if !content.is_empty() {
            self.record_content_write(&doc).await?;
        }

        info!(doc_id = %doc.id, owner = %owner_id, "Document created");
        Ok(doc)
    }

    /// Load a document by id
    pub async fn find(&self, id: &DocumentId) -> Result<Document> {
        self.adapter
            .fetch_document(id)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// List a user's documents, most recently updated first
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Document>> {
        Ok(self.adapter.list_documents_by_owner(owner_id).await?)
    }

    /// Apply a patch. With `client_etag` the write is guarded: a mismatch
    /// fails with `Error::EtagMismatch` and writes nothing. Omitting the
    /// etag is an explicit opt-out of concurrency control (last write wins).
    pub async fn update(
        &self,
        id: &DocumentId,
        patch: DocumentPatch,
        client_etag: Option<&str>,
    ) -> Result<Document> {
        let mut doc = self.find(id).await?;

        if let Some(expected) = client_etag {
            if expected != doc.etag {
                debug!(doc_id = %id, "Update rejected: stale etag");
                return Err(Error::EtagMismatch);
            }
        }

        let content_changed = doc.apply_patch(patch);

        match self.adapter.replace_document(&doc, client_etag).await? {
            CasOutcome::Applied => {}
            CasOutcome::Mismatch(_) => {
                debug!(doc_id = %id, "Update rejected: concurrent writer won the swap");
                return Err(Error::EtagMismatch);
            }
            CasOutcome::Missing => return Err(Error::DocumentNotFound(id.to_string())),
        }

        if content_changed {
            self.record_content_write(&doc).await?;
        }

        Ok(doc)
    }

    /// Synchronize client content against the authoritative copy.
    ///
    /// An etag mismatch returns the conflict payload without mutating
    /// anything, so a repeated stale sync is idempotent. A match proceeds
    /// through the same version-creation and retention path as `update`.
    pub async fn sync(
        &self,
        id: &DocumentId,
        content: &str,
        client_etag: &str,
    ) -> Result<SyncOutcome> {
        let mut doc = self.find(id).await?;

        if client_etag != doc.etag {
            debug!(doc_id = %id, "Sync conflict: stale etag");
            return Ok(SyncOutcome::Conflict(SyncConflict {
                server_content: doc.content,
                server_etag: doc.etag,
                server_timestamp: doc.updated_at,
            }));
        }

        if content == doc.content {
            return Ok(SyncOutcome::Success { document: doc });
        }

        doc.set_content(content.to_string());

        match self.adapter.replace_document(&doc, Some(client_etag)).await? {
            CasOutcome::Applied => {
                self.record_content_write(&doc).await?;
                Ok(SyncOutcome::Success { document: doc })
            }
            CasOutcome::Mismatch(current) => {
                debug!(doc_id = %id, "Sync conflict: concurrent writer won the swap");
                Ok(SyncOutcome::Conflict(SyncConflict {
                    server_content: current.content,
                    server_etag: current.etag,
                    server_timestamp: current.updated_at,
                }))
            }
            CasOutcome::Missing => Err(Error::DocumentNotFound(id.to_string())),
        }
    }

    /// Delete a document, cascading removal of its versions.
    /// Returns false if the document did not exist.
    pub async fn delete(&self, id: &DocumentId) -> Result<bool> {
        if !self.adapter.remove_document(id).await? {
            return Ok(false);
        }

        let removed = self.versions.remove_all(id).await?;
        info!(doc_id = %id, versions_removed = removed, "Document deleted");

        let _ = self.change_tx.send(DocumentChange::Deleted {
            document_id: id.clone(),
        });

        Ok(true)
    }

    /// Version creation, retention cleanup and change publication, all
    /// synchronous within the write that changed content.
    async fn record_content_write(&self, doc: &Document) -> Result<()> {
        self.versions.create_version(&doc.id, &doc.content).await?;
        self.versions
            .cleanup_old_versions(&doc.id, self.max_versions)
            .await?;

        let _ = self.change_tx.send(DocumentChange::Updated {
            document_id: doc.id.clone(),
            etag: doc.etag.clone(),
            updated_at: doc.updated_at,
            user_id: doc.owner_id.clone(),
        });

        Ok(())
    }
}
