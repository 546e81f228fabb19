//! Identity registry contract.

use async_trait::async_trait;

use crate::error::Result;
use crate::identity::Identity;

/// Central registry resolving identities to stable person ids (SortingHat).
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    /// Registers a batch of identities seen by `connector_name`.
    ///
    /// All-or-nothing from the caller's view: an error means the batch was
    /// not registered. Already known identities are not an error.
    async fn add_identities(&self, batch: &[Identity], connector_name: &str) -> Result<usize>;
}
