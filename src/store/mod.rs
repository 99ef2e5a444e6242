//! Storage collaborator contracts.
//!
//! The core never talks to a database directly; it consumes these traits.
//! Correctness of the optimistic write protocol is delegated to the
//! atomicity of `conditional_update` at the implementing store's boundary.
//! Every call site bounds a store future with [`bounded`] so a stalled
//! collaborator fails the request instead of hanging it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::occ::{Item, ItemFields};
use crate::principal::{PermissionSet, Principal};
use crate::token::Scope;

pub mod memory;

pub use memory::MemoryStore;

/// Failure surface of a storage collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Bound a store operation by `limit`. On expiry the operation is abandoned
/// and surfaces as [`StoreError::Unavailable`]; the conditional-write
/// contract guarantees an abandoned write left no partial effect.
pub async fn bounded<T, F>(limit: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "operation exceeded {}s timeout",
            limit.as_secs_f64()
        ))),
    }
}

/// Persists credential digests and resolves them back to principals.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Record a credential digest for a principal.
    async fn insert(
        &self,
        hash: [u8; 32],
        principal_id: i64,
        expires_at: u64,
        scope: Scope,
    ) -> Result<(), StoreError>;

    /// Resolve a digest to its owning principal. Unknown digests, expired
    /// credentials, and scope mismatches are all `NotFound`; callers must
    /// not be able to tell these apart.
    async fn lookup(&self, hash: [u8; 32], scope: Scope) -> Result<Principal, StoreError>;

    /// Remove every credential of `scope` belonging to a principal.
    async fn purge(&self, principal_id: i64, scope: Scope) -> Result<(), StoreError>;
}

/// Persists principals.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Store a new principal, assigning id, creation time, and version 1.
    async fn insert(&self, principal: &mut Principal) -> Result<(), StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<Principal, StoreError>;

    /// Conditional update keyed on the principal's current version. Returns
    /// the new version; `EditConflict` when the stored version moved.
    async fn update(&self, principal: &Principal) -> Result<u64, StoreError>;
}

/// Sources permission sets.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for(&self, principal_id: i64) -> Result<PermissionSet, StoreError>;

    async fn grant(&self, principal_id: i64, codes: &[&str]) -> Result<(), StoreError>;
}

/// Persists versioned catalog items.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Item, StoreError>;

    /// Store a new item, assigning id, creation time, and version 1.
    async fn insert(&self, item: &mut Item) -> Result<(), StoreError>;

    /// The single atomic commit of the write protocol: apply `fields` and
    /// increment the version, if and only if the stored version still equals
    /// `expected_version`. Returns the new version on success.
    async fn conditional_update(
        &self,
        id: i64,
        expected_version: u64,
        fields: ItemFields,
    ) -> Result<u64, StoreError>;
}
