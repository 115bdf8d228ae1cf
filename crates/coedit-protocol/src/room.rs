//! Typed room keys

use coedit_core::DocumentId;
use serde::{Deserialize, Serialize};

/// A broadcast room the hub fans out on.
///
/// Tagged by kind so user and document keys can never collide, unlike a
/// single string namespace with ad hoc prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKey {
    /// A connection's private channel
    User(String),
    /// A document's subscription channel
    Document(DocumentId),
}

impl RoomKey {
    pub fn is_document(&self) -> bool {
        matches!(self, RoomKey::Document(_))
    }

    pub fn as_document(&self) -> Option<&DocumentId> {
        match self {
            RoomKey::Document(id) => Some(id),
            RoomKey::User(_) => None,
        }
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKey::User(id) => write!(f, "user/{}", id),
            RoomKey::Document(id) => write!(f, "doc/{}", id),
        }
    }
}
