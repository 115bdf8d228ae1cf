//! Debounced edit synchronization

use coedit_core::{now_millis, ConflictInfo, ConflictResolver, Document, DocumentId, Resolution, Result};
use coedit_store::{DocumentRepository, SyncOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// What a sync attempt produced
#[derive(Debug, Clone)]
pub enum SyncStatus {
    /// Nothing pending
    Clean,
    /// A newer edit arrived during the debounce window; this flush did
    /// nothing and the newer edit's own flush will carry the content
    Superseded,
    /// Pending content accepted by the server
    Synced(Document),
    /// The server had diverged, the merge engine reconciled, and the
    /// merged content was accepted
    AutoMerged(Document),
    /// Overlapping divergence; the caller must decide via
    /// `resolve_conflict`. Never resolved silently.
    Conflict(ConflictInfo),
}

struct EditState {
    /// Content at the last successful sync; the merge base
    base_content: String,
    /// Server etag at the last successful sync
    etag: String,
    /// Latest local content not yet accepted by the server
    pending: Option<String>,
    /// Bumped on every edit; used to detect edits racing a flush
    generation: u64,
}

/// Client-side counterpart of the repository's sync path.
///
/// One coordinator per open document. Edits are noted as whole-content
/// snapshots; `flush_after_debounce` syncs once typing pauses.
pub struct SyncCoordinator {
    repository: Arc<DocumentRepository>,
    resolver: ConflictResolver,
    document_id: DocumentId,
    debounce: Duration,
    state: Mutex<EditState>,
}

impl SyncCoordinator {
    /// Attach to a loaded document
    pub fn for_document(
        repository: Arc<DocumentRepository>,
        document: &Document,
        debounce: Duration,
    ) -> Self {
        Self {
            repository,
            resolver: ConflictResolver::new(),
            document_id: document.id.clone(),
            debounce,
            state: Mutex::new(EditState {
                base_content: document.content.clone(),
                etag: document.etag.clone(),
                pending: None,
                generation: 0,
            }),
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Whether an edit is waiting to be synced
    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Record the latest local content. Cheap; called on every keystroke.
    pub fn note_edit(&self, content: impl Into<String>) {
        let mut state = self.state.lock();
        state.pending = Some(content.into());
        state.generation += 1;
    }

    /// Wait out the debounce window, then sync - unless a newer edit
    /// arrived in the meantime, in which case that edit's flush owns the
    /// content and this one steps aside.
    pub async fn flush_after_debounce(&self) -> Result<SyncStatus> {
        let generation = self.state.lock().generation;
        sleep(self.debounce).await;

        if self.state.lock().generation != generation {
            debug!(doc_id = %self.document_id, "Flush superseded by a newer edit");
            return Ok(SyncStatus::Superseded);
        }

        self.sync_now().await
    }

    /// Push pending content through the repository's sync path immediately
    pub async fn sync_now(&self) -> Result<SyncStatus> {
        let (content, etag, base, generation) = {
            let state = self.state.lock();
            match &state.pending {
                None => return Ok(SyncStatus::Clean),
                Some(content) => (
                    content.clone(),
                    state.etag.clone(),
                    state.base_content.clone(),
                    state.generation,
                ),
            }
        };

        match self.repository.sync(&self.document_id, &content, &etag).await? {
            SyncOutcome::Success { document } => {
                self.accept(&document, generation);
                Ok(SyncStatus::Synced(document))
            }
            SyncOutcome::Conflict(conflict) => {
                let info = ConflictInfo {
                    document_id: self.document_id.clone(),
                    base_content: base,
                    local_content: content,
                    remote_content: conflict.server_content,
                    local_timestamp: now_millis(),
                    remote_timestamp: conflict.server_timestamp,
                };
                self.reconcile(info, &conflict.server_etag, generation).await
            }
        }
    }

    /// Resolve a surfaced conflict by explicit choice and push the result
    pub async fn resolve_conflict(
        &self,
        conflict: ConflictInfo,
        resolution: Resolution,
    ) -> Result<SyncStatus> {
        let content = resolution.into_content(&conflict);
        let generation = self.state.lock().generation;

        let current = self.repository.find(&self.document_id).await?;
        match self
            .repository
            .sync(&self.document_id, &content, &current.etag)
            .await?
        {
            SyncOutcome::Success { document } => {
                info!(doc_id = %self.document_id, "Conflict resolved by explicit choice");
                self.accept(&document, generation);
                Ok(SyncStatus::Synced(document))
            }
            SyncOutcome::Conflict(newer) => Ok(SyncStatus::Conflict(ConflictInfo {
                document_id: self.document_id.clone(),
                base_content: conflict.base_content,
                local_content: content,
                remote_content: newer.server_content,
                local_timestamp: now_millis(),
                remote_timestamp: newer.server_timestamp,
            })),
        }
    }

    /// Try the merge engine on a divergence; on success push the merged
    /// content against the server's etag.
    async fn reconcile(
        &self,
        info: ConflictInfo,
        server_etag: &str,
        generation: u64,
    ) -> Result<SyncStatus> {
        let Some(merged) = self.resolver.attempt_auto_merge(&info) else {
            return Ok(SyncStatus::Conflict(info));
        };

        match self
            .repository
            .sync(&self.document_id, &merged, server_etag)
            .await?
        {
            SyncOutcome::Success { document } => {
                info!(doc_id = %self.document_id, "Divergence auto-merged");
                self.accept(&document, generation);
                Ok(SyncStatus::AutoMerged(document))
            }
            // The server moved again mid-merge; surface the fresh state
            SyncOutcome::Conflict(newer) => Ok(SyncStatus::Conflict(ConflictInfo {
                document_id: info.document_id,
                base_content: info.base_content,
                local_content: info.local_content,
                local_timestamp: info.local_timestamp,
                remote_content: newer.server_content,
                remote_timestamp: newer.server_timestamp,
            })),
        }
    }

    /// Adopt the server's accepted state as the new merge base. Pending is
    /// cleared only if no edit raced the sync.
    fn accept(&self, document: &Document, generation: u64) {
        let mut state = self.state.lock();
        state.base_content = document.content.clone();
        state.etag = document.etag.clone();
        if state.generation == generation {
            state.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coedit_store::MemoryStorage;

    async fn setup(content: &str) -> (Arc<DocumentRepository>, Document, SyncCoordinator) {
        let repository = Arc::new(DocumentRepository::new(Arc::new(MemoryStorage::new())));
        let document = repository
            .create("alice", "Notes", content, "text")
            .await
            .unwrap();
        let coordinator = SyncCoordinator::for_document(
            repository.clone(),
            &document,
            Duration::from_millis(10),
        );
        (repository, document, coordinator)
    }

    #[tokio::test]
    async fn test_clean_when_nothing_pending() {
        let (_repo, _doc, coordinator) = setup("hello").await;
        assert!(matches!(
            coordinator.sync_now().await.unwrap(),
            SyncStatus::Clean
        ));
    }

    #[tokio::test]
    async fn test_edit_syncs_and_clears_pending() {
        let (repo, doc, coordinator) = setup("hello").await;

        coordinator.note_edit("hello world");
        let status = coordinator.sync_now().await.unwrap();

        match status {
            SyncStatus::Synced(document) => assert_eq!(document.content, "hello world"),
            other => panic!("unexpected status: {:?}", other),
        }
        assert!(!coordinator.has_pending());

        let stored = repo.find(&doc.id).await.unwrap();
        assert_eq!(stored.content, "hello world");
    }

    #[tokio::test]
    async fn test_flush_superseded_by_newer_edit() {
        let repository = Arc::new(DocumentRepository::new(Arc::new(MemoryStorage::new())));
        let document = repository
            .create("alice", "Notes", "hello", "text")
            .await
            .unwrap();
        let coordinator = Arc::new(SyncCoordinator::for_document(
            repository,
            &document,
            Duration::from_millis(100),
        ));

        coordinator.note_edit("draft one");
        let flush = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.flush_after_debounce().await }
        });

        // Land a newer edit inside the debounce window
        sleep(Duration::from_millis(10)).await;
        coordinator.note_edit("draft two");

        assert!(matches!(
            flush.await.unwrap().unwrap(),
            SyncStatus::Superseded
        ));
        assert!(coordinator.has_pending());

        // The follow-up flush carries the newer content
        match coordinator.flush_after_debounce().await.unwrap() {
            SyncStatus::Synced(document) => assert_eq!(document.content, "draft two"),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disjoint_divergence_auto_merges() {
        let (repo, doc, coordinator) = setup("Line 1\nLine 2\nLine 3").await;

        // A second client changes line 3 behind our back
        let remote = repo
            .sync(&doc.id, "Line 1\nLine 2\nLine 3 changed", &doc.etag)
            .await
            .unwrap();
        assert!(matches!(remote, SyncOutcome::Success { .. }));

        // We change line 1 locally against the stale base
        coordinator.note_edit("Line 1 changed\nLine 2\nLine 3");

        match coordinator.sync_now().await.unwrap() {
            SyncStatus::AutoMerged(document) => {
                assert_eq!(document.content, "Line 1 changed\nLine 2\nLine 3 changed");
            }
            other => panic!("unexpected status: {:?}", other),
        }

        let stored = repo.find(&doc.id).await.unwrap();
        assert_eq!(stored.content, "Line 1 changed\nLine 2\nLine 3 changed");
    }

    #[tokio::test]
    async fn test_overlapping_divergence_surfaces_conflict() {
        let (repo, doc, coordinator) = setup("Line 1\nLine 2\nLine 3").await;

        repo.sync(&doc.id, "Line 1\nLine 2 remote\nLine 3", &doc.etag)
            .await
            .unwrap();

        coordinator.note_edit("Line 1\nLine 2 local\nLine 3");

        let conflict = match coordinator.sync_now().await.unwrap() {
            SyncStatus::Conflict(info) => info,
            other => panic!("unexpected status: {:?}", other),
        };

        assert_eq!(conflict.base_content, "Line 1\nLine 2\nLine 3");
        assert_eq!(conflict.local_content, "Line 1\nLine 2 local\nLine 3");
        assert_eq!(conflict.remote_content, "Line 1\nLine 2 remote\nLine 3");

        // Nothing was written by the failed sync
        let stored = repo.find(&doc.id).await.unwrap();
        assert_eq!(stored.content, "Line 1\nLine 2 remote\nLine 3");
    }

    #[tokio::test]
    async fn test_conflict_resolved_by_keeping_local() {
        let (repo, doc, coordinator) = setup("base").await;

        repo.sync(&doc.id, "remote version", &doc.etag).await.unwrap();
        coordinator.note_edit("local version");

        let conflict = match coordinator.sync_now().await.unwrap() {
            SyncStatus::Conflict(info) => info,
            other => panic!("unexpected status: {:?}", other),
        };

        match coordinator
            .resolve_conflict(conflict, Resolution::KeepLocal)
            .await
            .unwrap()
        {
            SyncStatus::Synced(document) => assert_eq!(document.content, "local version"),
            other => panic!("unexpected status: {:?}", other),
        }

        let stored = repo.find(&doc.id).await.unwrap();
        assert_eq!(stored.content, "local version");
    }

    #[tokio::test]
    async fn test_conflict_resolved_manually() {
        let (repo, doc, coordinator) = setup("base").await;

        repo.sync(&doc.id, "remote version", &doc.etag).await.unwrap();
        coordinator.note_edit("local version");

        let conflict = match coordinator.sync_now().await.unwrap() {
            SyncStatus::Conflict(info) => info,
            other => panic!("unexpected status: {:?}", other),
        };

        coordinator
            .resolve_conflict(conflict, Resolution::Manual("hand-merged".into()))
            .await
            .unwrap();

        let stored = repo.find(&doc.id).await.unwrap();
        assert_eq!(stored.content, "hand-merged");
    }

    #[tokio::test]
    async fn test_sequential_edits_keep_base_current() {
        let (_repo, _doc, coordinator) = setup("v1").await;

        coordinator.note_edit("v2");
        coordinator.sync_now().await.unwrap();

        coordinator.note_edit("v3");
        match coordinator.sync_now().await.unwrap() {
            SyncStatus::Synced(document) => assert_eq!(document.content, "v3"),
            other => panic!("unexpected status: {:?}", other),
        }
    }
}
