//! Coedit Storage
//!
//! Provides pluggable persistence for documents and their version history:
//! - Memory (default): Fast, volatile storage
//! - SQLite: Embedded persistence
//!
//! On top of the adapter sit the `VersionStore` (append-only version ledger
//! with bounded retention) and the `DocumentRepository` (optimistic-
//! concurrency write paths and the durable change feed).

pub mod memory;
pub mod repository;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod versions;

use async_trait::async_trait;
use coedit_core::{Document, DocumentId, DocumentVersion};

/// Outcome of an etag-guarded document replacement
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The write was applied
    Applied,
    /// The stored etag differed; carries the current authoritative copy.
    /// Nothing was written.
    Mismatch(Document),
    /// No document with that id exists
    Missing,
}

/// Storage backend contract.
///
/// `replace_document` with an expected etag MUST execute the compare and the
/// swap as a single atomic step. The repository performs no locking of its
/// own; every adapter implementation carries this obligation.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Insert a new document. Fails if the id is already present.
    async fn insert_document(&self, doc: &Document) -> Result<(), StorageError>;

    /// Load a document by id
    async fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, StorageError>;

    /// List documents owned by a user, most recently updated first
    async fn list_documents_by_owner(&self, owner_id: &str)
        -> Result<Vec<Document>, StorageError>;

    /// Replace a stored document, optionally guarded by an expected etag
    async fn replace_document(
        &self,
        doc: &Document,
        expected_etag: Option<&str>,
    ) -> Result<CasOutcome, StorageError>;

    /// Remove a document. Returns false if it did not exist.
    async fn remove_document(&self, id: &DocumentId) -> Result<bool, StorageError>;

    /// Append a version row
    async fn insert_version(&self, version: &DocumentVersion) -> Result<(), StorageError>;

    /// Load a version by id
    async fn fetch_version(&self, id: &str) -> Result<Option<DocumentVersion>, StorageError>;

    /// All versions of a document, newest first by version number
    async fn versions_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<DocumentVersion>, StorageError>;

    /// Highest version number for a document, 0 if none exist
    async fn max_version_number(&self, id: &DocumentId) -> Result<u64, StorageError>;

    /// Delete every version of a document with a number below `min_version`.
    /// Returns the number of rows removed.
    async fn prune_versions_below(
        &self,
        id: &DocumentId,
        min_version: u64,
    ) -> Result<usize, StorageError>;

    /// Delete all versions of a document (delete cascade).
    /// Returns the number of rows removed.
    async fn remove_versions_for_document(&self, id: &DocumentId)
        -> Result<usize, StorageError>;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<StorageError> for coedit_core::Error {
    fn from(err: StorageError) -> Self {
        coedit_core::Error::Storage(err.to_string())
    }
}

pub use memory::MemoryStorage;
pub use repository::{DocumentChange, DocumentRepository, SyncConflict, SyncOutcome};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
pub use versions::{VersionStore, DEFAULT_MAX_VERSIONS};
