//! Token resolution

use async_trait::async_trait;
use std::collections::HashMap;

/// The identity a resolved token maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// External user-lookup collaborator.
///
/// The hub only verifies opaque bearer tokens; issuing them is someone
/// else's job. `None` means the token is unknown or invalid.
#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<UserIdentity>;
}

/// Fixed token-to-user map, loaded from configuration at startup
#[derive(Debug, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, String>,
}

impl StaticTokenResolver {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn insert(&mut self, token: impl Into<String>, user_id: impl Into<String>) {
        self.tokens.insert(token.into(), user_id.into());
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl AuthResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Option<UserIdentity> {
        self.tokens.get(token).map(UserIdentity::new)
    }
}
