//! SQLite storage backend

use crate::{CasOutcome, StorageAdapter, StorageError};
use async_trait::async_trait;
use coedit_core::{Document, DocumentId, DocumentVersion};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

/// SQLite storage backend
///
/// Embedded persistence suitable for single-node deployments.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::Database(e.to_string()))?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Database(e.to_string()))?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                language TEXT NOT NULL,
                etag TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);

            CREATE TABLE IF NOT EXISTS document_versions (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                content TEXT NOT NULL,
                version_number INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(document_id, version_number)
            );

            CREATE INDEX IF NOT EXISTS idx_versions_document
                ON document_versions(document_id, version_number DESC);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let id = DocumentId::new(id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Document {
        id,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        language: row.get(4)?,
        etag: row.get(5)?,
        created_at: row.get::<_, i64>(6)? as u64,
        updated_at: row.get::<_, i64>(7)? as u64,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentVersion> {
    let document_id: String = row.get(1)?;
    let document_id = DocumentId::new(document_id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(DocumentVersion {
        id: row.get(0)?,
        document_id,
        content: row.get(2)?,
        version_number: row.get::<_, i64>(3)? as u64,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

const DOCUMENT_COLUMNS: &str = "id, owner_id, title, content, language, etag, created_at, updated_at";
const VERSION_COLUMNS: &str = "id, document_id, content, version_number, created_at";

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn insert_document(&self, doc: &Document) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.execute(
            "INSERT INTO documents (id, owner_id, title, content, language, etag, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doc.id.as_str(),
                doc.owner_id,
                doc.title,
                doc.content,
                doc.language,
                doc.etag,
                doc.created_at as i64,
                doc.updated_at as i64,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::AlreadyExists(doc.id.to_string()))
            }
            Err(e) => Err(StorageError::Database(e.to_string())),
        }
    }

    async fn fetch_document(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
            params![id.as_str()],
            document_from_row,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn list_documents_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Document>, StorageError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents WHERE owner_id = ?1 ORDER BY updated_at DESC",
                DOCUMENT_COLUMNS
            ))
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let docs = stmt
            .query_map(params![owner_id], document_from_row)
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(docs)
    }

    async fn replace_document(
        &self,
        doc: &Document,
        expected_etag: Option<&str>,
    ) -> Result<CasOutcome, StorageError> {
        let conn = self.conn.lock().unwrap();

        // A single guarded UPDATE is the atomic compare-and-swap; SQLite
        // executes the statement under its own lock.
        let affected = match expected_etag {
            Some(expected) => conn
                .execute(
                    "UPDATE documents
                     SET owner_id = ?2, title = ?3, content = ?4, language = ?5,
                         etag = ?6, created_at = ?7, updated_at = ?8
                     WHERE id = ?1 AND etag = ?9",
                    params![
                        doc.id.as_str(),
                        doc.owner_id,
                        doc.title,
                        doc.content,
                        doc.language,
                        doc.etag,
                        doc.created_at as i64,
                        doc.updated_at as i64,
                        expected,
                    ],
                )
                .map_err(|e| StorageError::Database(e.to_string()))?,
            None => conn
                .execute(
                    "UPDATE documents
                     SET owner_id = ?2, title = ?3, content = ?4, language = ?5,
                         etag = ?6, created_at = ?7, updated_at = ?8
                     WHERE id = ?1",
                    params![
                        doc.id.as_str(),
                        doc.owner_id,
                        doc.title,
                        doc.content,
                        doc.language,
                        doc.etag,
                        doc.created_at as i64,
                        doc.updated_at as i64,
                    ],
                )
                .map_err(|e| StorageError::Database(e.to_string()))?,
        };

        if affected > 0 {
            return Ok(CasOutcome::Applied);
        }

        let current = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![doc.id.as_str()],
                document_from_row,
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        match current {
            Some(current) => Ok(CasOutcome::Mismatch(current)),
            None => Ok(CasOutcome::Missing),
        }
    }

    async fn remove_document(&self, id: &DocumentId) -> Result<bool, StorageError> {
        let conn = self.conn.lock().unwrap();

        let affected = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id.as_str()])
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(affected > 0)
    }

    async fn insert_version(&self, version: &DocumentVersion) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO document_versions (id, document_id, content, version_number, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                version.id,
                version.document_id.as_str(),
                version.content,
                version.version_number as i64,
                version.created_at as i64,
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    async fn fetch_version(&self, id: &str) -> Result<Option<DocumentVersion>, StorageError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {} FROM document_versions WHERE id = ?1", VERSION_COLUMNS),
            params![id],
            version_from_row,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn versions_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<DocumentVersion>, StorageError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM document_versions WHERE document_id = ?1
                 ORDER BY version_number DESC",
                VERSION_COLUMNS
            ))
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let versions = stmt
            .query_map(params![id.as_str()], version_from_row)
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(versions)
    }

    async fn max_version_number(&self, id: &DocumentId) -> Result<u64, StorageError> {
        let conn = self.conn.lock().unwrap();

        let max: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version_number), 0) FROM document_versions
                 WHERE document_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(max as u64)
    }

    async fn prune_versions_below(
        &self,
        id: &DocumentId,
        min_version: u64,
    ) -> Result<usize, StorageError> {
        let conn = self.conn.lock().unwrap();

        let affected = conn
            .execute(
                "DELETE FROM document_versions WHERE document_id = ?1 AND version_number < ?2",
                params![id.as_str(), min_version as i64],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(affected)
    }

    async fn remove_versions_for_document(
        &self,
        id: &DocumentId,
    ) -> Result<usize, StorageError> {
        let conn = self.conn.lock().unwrap();

        let affected = conn
            .execute(
                "DELETE FROM document_versions WHERE document_id = ?1",
                params![id.as_str()],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, owner: &str, content: &str) -> Document {
        Document::new(DocumentId::new(id).unwrap(), owner, "Title", content, "text")
    }

    #[tokio::test]
    async fn test_sqlite_document_crud() {
        let storage = SqliteStorage::in_memory().unwrap();
        let document = doc("doc:sqlite", "alice", "hello sqlite");

        storage.insert_document(&document).await.unwrap();

        let loaded = storage.fetch_document(&document.id).await.unwrap().unwrap();
        assert_eq!(loaded, document);

        assert!(storage.remove_document(&document.id).await.unwrap());
        assert!(storage.fetch_document(&document.id).await.unwrap().is_none());
        assert!(!storage.remove_document(&document.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_duplicate_insert() {
        let storage = SqliteStorage::in_memory().unwrap();
        let document = doc("doc:dup", "alice", "x");

        storage.insert_document(&document).await.unwrap();
        assert!(matches!(
            storage.insert_document(&document).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_cas() {
        let storage = SqliteStorage::in_memory().unwrap();
        let mut document = doc("doc:cas", "alice", "v1");
        storage.insert_document(&document).await.unwrap();

        let old_etag = document.etag.clone();
        document.set_content("v2".into());

        // Stale guard: no write happens
        match storage
            .replace_document(&document, Some("bogus"))
            .await
            .unwrap()
        {
            CasOutcome::Mismatch(current) => assert_eq!(current.content, "v1"),
            other => panic!("expected Mismatch, got {:?}", other),
        }

        // Matching guard applies
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
    async fn test_sqlite_versions() {
        let storage = SqliteStorage::in_memory().unwrap();
        let id = DocumentId::new("doc:v").unwrap();

        for n in 1..=4 {
            storage
                .insert_version(&DocumentVersion::new(id.clone(), format!("v{}", n), n))
                .await
                .unwrap();
        }

        assert_eq!(storage.max_version_number(&id).await.unwrap(), 4);

        let versions = storage.versions_for_document(&id).await.unwrap();
        let numbers: Vec<u64> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![4, 3, 2, 1]);

        let first = storage.fetch_version(&versions[0].id).await.unwrap().unwrap();
        assert_eq!(first.version_number, 4);

        assert_eq!(storage.prune_versions_below(&id, 3).await.unwrap(), 2);
        assert_eq!(storage.versions_for_document(&id).await.unwrap().len(), 2);

        assert_eq!(storage.remove_versions_for_document(&id).await.unwrap(), 2);
        assert_eq!(storage.max_version_number(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coedit.db");

        let storage = SqliteStorage::new(&path).unwrap();
        let document = doc("doc:disk", "alice", "persisted");
        storage.insert_document(&document).await.unwrap();
        drop(storage);

        let storage = SqliteStorage::new(&path).unwrap();
        let loaded = storage.fetch_document(&document.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "persisted");
    }
}
