//! Document and version records

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Document identifier - UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidDocumentId("Document ID cannot be empty".into()));
        }

        if id.len() > 512 {
            return Err(Error::InvalidDocumentId("Document ID exceeds 512 bytes".into()));
        }

        // Validate pattern: [a-zA-Z0-9:_-]+
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-') {
            return Err(Error::InvalidDocumentId(
                "Document ID must match pattern [a-zA-Z0-9:_-]+".into(),
            ));
        }

        Ok(Self(id))
    }

    /// Generate a fresh random document ID
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current time as unix milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Deterministic content fingerprint (SHA-256, lower hex).
///
/// The etag is the sole optimistic-concurrency token: it is recomputed on
/// every content-changing write and compared byte-for-byte on guarded writes.
pub fn content_etag(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// An authoritative server-side document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    pub language: String,
    pub etag: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Document {
    /// Create a new document owned by `owner_id`, fingerprinting the content
    pub fn new(
        id: DocumentId,
        owner_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let now = now_millis();

        Self {
            id,
            owner_id: owner_id.into(),
            title: title.into(),
            etag: content_etag(&content),
            content,
            language: language.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the content, recomputing the etag and bumping `updated_at`
    pub fn set_content(&mut self, content: String) {
        self.etag = content_etag(&content);
        self.content = content;
        self.updated_at = now_millis();
    }

    /// Apply a metadata/content patch. Returns true if the content changed.
    pub fn apply_patch(&mut self, patch: DocumentPatch) -> bool {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }

        let content_changed = match patch.content {
            Some(content) if content != self.content => {
                self.etag = content_etag(&content);
                self.content = content;
                true
            }
            _ => false,
        };

        self.updated_at = now_millis();
        content_changed
    }
}

/// Partial update applied by `DocumentRepository::update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub language: Option<String>,
}

impl DocumentPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// A snapshot in a document's append-only version history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: String,
    pub document_id: DocumentId,
    pub content: String,
    pub version_number: u64,
    pub created_at: u64,
}

impl DocumentVersion {
    pub fn new(document_id: DocumentId, content: impl Into<String>, version_number: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id,
            content: content.into(),
            version_number,
            created_at: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_valid() {
        assert!(DocumentId::new("doc:123").is_ok());
        assert!(DocumentId::new("notes_draft-7").is_ok());
    }

    #[test]
    fn test_document_id_invalid() {
        assert!(DocumentId::new("").is_err());
        assert!(DocumentId::new("doc/123").is_err()); // invalid char
        assert!(DocumentId::new("a".repeat(513)).is_err()); // too long
    }

    #[test]
    fn test_etag_deterministic() {
        assert_eq!(content_etag("hello"), content_etag("hello"));
        assert_ne!(content_etag("hello"), content_etag("hello "));
        assert_eq!(content_etag("").len(), 64);
    }

    #[test]
    fn test_etag_tracks_content() {
        let id = DocumentId::new("doc:1").unwrap();
        let mut doc = Document::new(id, "alice", "Notes", "first", "markdown");
        let original = doc.etag.clone();
        assert_eq!(original, content_etag("first"));

        doc.set_content("second".into());
        assert_eq!(doc.etag, content_etag("second"));
        assert_ne!(doc.etag, original);
    }

    #[test]
    fn test_patch_reports_content_change() {
        let id = DocumentId::new("doc:2").unwrap();
        let mut doc = Document::new(id, "alice", "Notes", "body", "markdown");

        assert!(!doc.apply_patch(DocumentPatch::title("Renamed")));
        assert_eq!(doc.title, "Renamed");

        // Same content is not a content change
        assert!(!doc.apply_patch(DocumentPatch::content("body")));

        assert!(doc.apply_patch(DocumentPatch::content("new body")));
        assert_eq!(doc.etag, content_etag("new body"));
    }

    #[test]
    fn test_version_record() {
        let id = DocumentId::new("doc:3").unwrap();
        let version = DocumentVersion::new(id.clone(), "content", 1);
        assert_eq!(version.document_id, id);
        assert_eq!(version.version_number, 1);
        assert!(!version.id.is_empty());
    }
}
