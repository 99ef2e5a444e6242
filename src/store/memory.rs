//! In-memory reference implementation of the storage contracts.
//!
//! Backs the demo binary and the test suites. Conditional updates take the
//! map entry's write guard for the whole check-and-apply, giving the same
//! atomicity a relational store provides with
//! `UPDATE ... WHERE id = $1 AND version = $2`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::occ::{Item, ItemFields};
use crate::principal::{PermissionSet, Principal};
use crate::store::{
    CredentialStore, PermissionStore, PrincipalStore, ResourceStore, StoreError,
};
use crate::token::{unix_now, Scope};

#[derive(Debug, Clone)]
struct CredentialRecord {
    principal_id: i64,
    expires_at: u64,
    scope: Scope,
}

/// One store implementing all four contracts, the shape the demo wiring
/// wants. Tests may wrap individual traits to inject faults.
#[derive(Default)]
pub struct MemoryStore {
    principals: DashMap<i64, Principal>,
    emails: DashMap<String, i64>,
    credentials: DashMap<[u8; 32], CredentialRecord>,
    permissions: DashMap<i64, HashSet<String>>,
    items: DashMap<i64, Item>,
    next_principal_id: AtomicI64,
    next_item_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_principal_id: AtomicI64::new(1),
            next_item_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Number of stored credentials, across scopes.
    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert(
        &self,
        hash: [u8; 32],
        principal_id: i64,
        expires_at: u64,
        scope: Scope,
    ) -> Result<(), StoreError> {
        self.credentials.insert(
            hash,
            CredentialRecord {
                principal_id,
                expires_at,
                scope,
            },
        );
        Ok(())
    }

    async fn lookup(&self, hash: [u8; 32], scope: Scope) -> Result<Principal, StoreError> {
        let record = match self.credentials.get(&hash) {
            Some(record) => record.clone(),
            None => return Err(StoreError::NotFound),
        };

        // Expired and wrong-scope lookups are indistinguishable from misses.
        if record.scope != scope || record.expires_at <= unix_now() {
            return Err(StoreError::NotFound);
        }

        self.principals
            .get(&record.principal_id)
            .map(|p| p.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn purge(&self, principal_id: i64, scope: Scope) -> Result<(), StoreError> {
        self.credentials
            .retain(|_, record| !(record.principal_id == principal_id && record.scope == scope));
        Ok(())
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn insert(&self, principal: &mut Principal) -> Result<(), StoreError> {
        let id = self.next_principal_id.fetch_add(1, Ordering::SeqCst);

        // The entry guard makes the uniqueness check and the claim atomic,
        // as a unique index would.
        match self.emails.entry(principal.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateEmail),
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        principal.id = id;
        principal.created_at = unix_now();
        principal.version = 1;
        self.principals.insert(id, principal.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<Principal, StoreError> {
        let id = match self.emails.get(email) {
            Some(id) => *id,
            None => return Err(StoreError::NotFound),
        };
        self.principals
            .get(&id)
            .map(|p| p.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, principal: &Principal) -> Result<u64, StoreError> {
        match self.principals.get_mut(&principal.id) {
            Some(mut stored) if stored.version == principal.version => {
                if stored.email != principal.email {
                    if self.emails.contains_key(&principal.email) {
                        return Err(StoreError::DuplicateEmail);
                    }
                    self.emails.remove(&stored.email);
                    self.emails.insert(principal.email.clone(), principal.id);
                }

                let new_version = stored.version + 1;
                *stored = Principal {
                    version: new_version,
                    ..principal.clone()
                };
                Ok(new_version)
            }
            Some(_) => Err(StoreError::EditConflict),
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn permissions_for(&self, principal_id: i64) -> Result<PermissionSet, StoreError> {
        Ok(self
            .permissions
            .get(&principal_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant(&self, principal_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let mut entry = self.permissions.entry(principal_id).or_default();
        for code in codes {
            entry.insert((*code).to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Item, StoreError> {
        self.items
            .get(&id)
            .map(|item| item.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, item: &mut Item) -> Result<(), StoreError> {
        let id = self.next_item_id.fetch_add(1, Ordering::SeqCst);
        item.id = id;
        item.created_at = unix_now();
        item.version = 1;
        self.items.insert(id, item.clone());
        Ok(())
    }

    async fn conditional_update(
        &self,
        id: i64,
        expected_version: u64,
        fields: ItemFields,
    ) -> Result<u64, StoreError> {
        // The entry guard is held across the version check and the write,
        // so concurrent committers serialize here and exactly one of them
        // observes a matching version.
        match self.items.get_mut(&id) {
            Some(mut item) if item.version == expected_version => {
                fields.apply_to(&mut item);
                item.version += 1;
                Ok(item.version)
            }
            Some(_) => Err(StoreError::EditConflict),
            None => Err(StoreError::NotFound),
        }
    }
}
