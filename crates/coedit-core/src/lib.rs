//! Coedit Core - Document Model and Merge Engine
//!
//! This crate provides the core functionality for Coedit:
//! - Document and version records with content fingerprinting
//! - Three-way line merge with LCS alignment
//! - Conflict detection and auto-resolution

pub mod document;
pub mod error;
pub mod merge;
pub mod resolver;

pub use document::{content_etag, now_millis, Document, DocumentId, DocumentPatch, DocumentVersion};
pub use error::{Error, Result};
pub use merge::{merge_lines, merge_text, MergeOutcome};
pub use resolver::{ConflictInfo, ConflictResolver, Resolution};
