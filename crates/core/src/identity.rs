//! Contributor identities extracted from items.

use serde::{Deserialize, Serialize};

/// An unverified identity as found in an item's author-like fields.
///
/// Equality covers every field; the loader relies on it to deduplicate
/// within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    /// Data source the identity was seen in
    pub source: String,
}

impl Identity {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            name: None,
            email: None,
            username: None,
            source: source.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// True when no identifying field is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.username.is_none()
    }
}
