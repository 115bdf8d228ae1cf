//! In-memory storage backend

use crate::{CasOutcome, StorageAdapter, StorageError};
use async_trait::async_trait;
use coedit_core::{Document, DocumentId, DocumentVersion};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and tests.
/// Data is lost when the process exits.
pub struct MemoryStorage {
    documents: DashMap<String, Document>,
    /// Version rows indexed by version id
    versions: DashMap<String, DocumentVersion>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            versions: DashMap::new(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn insert_document(&self, doc: &Document) -> Result<(), StorageError> {
        match self.documents.entry(doc.id.as_str().to_string()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(doc.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(doc.clone());
                Ok(())
            }
        }
    }

    async fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        Ok(self.documents.get(id.as_str()).map(|r| r.value().clone()))
    }

    async fn list_documents_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Document>, StorageError> {
        let mut docs: Vec<Document> = self
            .documents
            .iter()
            .filter(|entry| entry.value().owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(docs)
    }

    async fn replace_document(
        &self,
        doc: &Document,
        expected_etag: Option<&str>,
    ) -> Result<CasOutcome, StorageError> {
        // The entry guard holds the shard lock for the whole check-then-write,
        // which is what makes this a real compare-and-swap.
        match self.documents.entry(doc.id.as_str().to_string()) {
            Entry::Occupied(mut slot) => {
                if let Some(expected) = expected_etag {
                    if slot.get().etag != expected {
                        return Ok(CasOutcome::Mismatch(slot.get().clone()));
                    }
                }
                slot.insert(doc.clone());
                Ok(CasOutcome::Applied)
            }
            Entry::Vacant(_) => Ok(CasOutcome::Missing),
        }
    }

    async fn remove_document(&self, id: &DocumentId) -> Result<bool, StorageError> {
        Ok(self.documents.remove(id.as_str()).is_some())
    }

    async fn insert_version(&self, version: &DocumentVersion) -> Result<(), StorageError> {
        match self.versions.entry(version.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(version.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(version.clone());
                Ok(())
            }
        }
    }

    async fn fetch_version(&self, id: &str) -> Result<Option<DocumentVersion>, StorageError> {
        Ok(self.versions.get(id).map(|r| r.value().clone()))
    }

    async fn versions_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<DocumentVersion>, StorageError> {
        let mut versions: Vec<DocumentVersion> = self
            .versions
            .iter()
            .filter(|entry| &entry.value().document_id == id)
            .map(|entry| entry.value().clone())
            .collect();
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    async fn max_version_number(&self, id: &DocumentId) -> Result<u64, StorageError> {
        Ok(self
            .versions
            .iter()
            .filter(|entry| &entry.value().document_id == id)
            .map(|entry| entry.value().version_number)
            .max()
            .unwrap_or(0))
    }

    async fn prune_versions_below(
        &self,
        id: &DocumentId,
        min_version: u64,
    ) -> Result<usize, StorageError> {
        let before = self.versions.len();
        self.versions
            .retain(|_, v| &v.document_id != id || v.version_number >= min_version);
        Ok(before - self.versions.len())
    }

    async fn remove_versions_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<usize, StorageError> {
        let before = self.versions.len();
        self.versions.retain(|_, v| &v.document_id != id);
        Ok(before - self.versions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, owner: &str, content: &str) -> Document {
        Document::new(DocumentId::new(id).unwrap(), owner, "Title", content, "text")
    }

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let storage = MemoryStorage::new();
        let document = doc("doc:1", "alice", "hello");

        storage.insert_document(&document).await.unwrap();

        let loaded = storage.fetch_document(&document.id).await.unwrap().unwrap();
        assert_eq!(loaded, document);
    }

    #[tokio::test]
    async fn test_insert_duplicate_fails() {
        let storage = MemoryStorage::new();
        let document = doc("doc:1", "alice", "hello");

        storage.insert_document(&document).await.unwrap();
        assert!(storage.insert_document(&document).await.is_err());
    }

    #[tokio::test]
    async fn test_cas_applies_on_matching_etag() {
        let storage = MemoryStorage::new();
        let mut document = doc("doc:1", "alice", "v1");
        storage.insert_document(&document).await.unwrap();

        let old_etag = document.etag.clone();
        document.set_content("v2".into());

        match storage
            .replace_document(&document, Some(&old_etag))
            .await
            .unwrap()
        {
            CasOutcome::Applied => {}
            other => panic!("expected Applied, got {:?}", other),
        }

        let loaded = storage.fetch_document(&document.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "v2");
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_etag_without_writing() {
        let storage = MemoryStorage::new();
        let mut document = doc("doc:1", "alice", "v1");
        storage.insert_document(&document).await.unwrap();

        document.set_content("v2".into());

        match storage
            .replace_document(&document, Some("stale-etag"))
            .await
            .unwrap()
        {
            CasOutcome::Mismatch(current) => assert_eq!(current.content, "v1"),
            other => panic!("expected Mismatch, got {:?}", other),
        }

        let loaded = storage.fetch_document(&document.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "v1");
    }

    #[tokio::test]
    async fn test_cas_missing_document() {
        let storage = MemoryStorage::new();
        let document = doc("doc:ghost", "alice", "v1");

        match storage.replace_document(&document, None).await.unwrap() {
            CasOutcome::Missing => {}
            other => panic!("expected Missing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_rows_and_pruning() {
        let storage = MemoryStorage::new();
        let id = DocumentId::new("doc:1").unwrap();

        for n in 1..=5 {
            let version = DocumentVersion::new(id.clone(), format!("v{}", n), n);
            storage.insert_version(&version).await.unwrap();
        }

        assert_eq!(storage.max_version_number(&id).await.unwrap(), 5);

        let versions = storage.versions_for_document(&id).await.unwrap();
        assert_eq!(versions.len(), 5);
        assert_eq!(versions[0].version_number, 5); // newest first

        let removed = storage.prune_versions_below(&id, 4).await.unwrap();
        assert_eq!(removed, 3);

        let versions = storage.versions_for_document(&id).await.unwrap();
        let numbers: Vec<u64> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![5, 4]);
    }

    #[tokio::test]
    async fn test_remove_versions_cascade() {
        let storage = MemoryStorage::new();
        let id = DocumentId::new("doc:1").unwrap();
        let other = DocumentId::new("doc:2").unwrap();

        for n in 1..=3 {
            storage
                .insert_version(&DocumentVersion::new(id.clone(), "x", n))
                .await
                .unwrap();
        }
        storage
            .insert_version(&DocumentVersion::new(other.clone(), "y", 1))
            .await
            .unwrap();

        assert_eq!(storage.remove_versions_for_document(&id).await.unwrap(), 3);
        assert_eq!(storage.versions_for_document(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_owner() {
        let storage = MemoryStorage::new();
        storage.insert_document(&doc("doc:1", "alice", "a")).await.unwrap();
        storage.insert_document(&doc("doc:2", "alice", "b")).await.unwrap();
        storage.insert_document(&doc("doc:3", "bob", "c")).await.unwrap();

        assert_eq!(storage.list_documents_by_owner("alice").await.unwrap().len(), 2);
        assert_eq!(storage.list_documents_by_owner("bob").await.unwrap().len(), 1);
        assert!(storage.list_documents_by_owner("carol").await.unwrap().is_empty());
    }
}
