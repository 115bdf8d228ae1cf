//! Error types for Coedit Core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Etag mismatch on guarded write")]
    EtagMismatch,

    #[error("Document already exists: {0}")]
    DocumentExists(String),

    #[error("Merge conflict requires manual resolution")]
    MergeConflict,

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for Coedit Core operations
pub type Result<T> = std::result::Result<T, Error>;
