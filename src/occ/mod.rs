//! Optimistic concurrency control for versioned resources.
//!
//! No in-process locking: the caller states the version it last observed,
//! and the only authoritative commit is the store's single conditional
//! write. A stated version may arrive explicitly in the
//! `X-Expected-Version` header, which short-circuits to a conflict before
//! storage is touched, or implicitly by round-tripping the previously read
//! resource body.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use serde::Serialize;

use crate::errors::GateError;
use crate::store::{bounded, ResourceStore, StoreError};

/// Request header carrying the caller's expected resource version.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

/// A versioned catalog item, the mutable business entity behind the write
/// protocol. `version` strictly increases on every committed update.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    #[serde(skip)]
    pub created_at: u64,
    pub name: String,
    pub tags: Vec<String>,
    pub version: u64,
}

impl Item {
    pub fn new(name: String, tags: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: 0,
            name,
            tags,
            version: 0,
        }
    }
}

/// Partial update: only populated fields change.
#[derive(Debug, Clone, Default)]
pub struct ItemFields {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ItemFields {
    pub fn apply_to(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(tags) = &self.tags {
            item.tags = tags.clone();
        }
    }
}

/// Fail fast when the caller's stated version no longer matches the current
/// one. A missing or non-numeric header is treated as no precondition; the
/// conditional write still guards the commit either way.
pub fn check_precondition(headers: &HeaderMap, current_version: u64) -> Result<(), GateError> {
    let Some(value) = headers.get(EXPECTED_VERSION_HEADER) else {
        return Ok(());
    };

    let stated = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            GateError::BadRequest(format!(
                "invalid {} header: expected an integer version",
                EXPECTED_VERSION_HEADER
            ))
        })?;

    if stated != current_version {
        return Err(GateError::EditConflict);
    }
    Ok(())
}

/// Guards mutation of versioned items.
#[derive(Clone)]
pub struct WriteController {
    pub resources: Arc<dyn ResourceStore>,
    pub storage_timeout: Duration,
}

impl WriteController {
    pub fn new(resources: Arc<dyn ResourceStore>, storage_timeout: Duration) -> Self {
        Self {
            resources,
            storage_timeout,
        }
    }

    pub async fn get(&self, id: i64) -> Result<Item, GateError> {
        bounded(self.storage_timeout, self.resources.get(id))
            .await
            .map_err(GateError::from)
    }

    pub async fn create(&self, mut item: Item) -> Result<Item, GateError> {
        bounded(self.storage_timeout, self.resources.insert(&mut item)).await?;
        Ok(item)
    }

    /// Commit an update against the version the caller last read. The
    /// conditional write is the sole arbiter: a concurrent writer that got
    /// there first moved the version, the store reports no match, and the
    /// caller sees a conflict. A vanished row during the race reports the
    /// same conflict, exactly as a relational `UPDATE ... RETURNING` with
    /// zero rows would.
    pub async fn commit(
        &self,
        id: i64,
        expected_version: u64,
        fields: ItemFields,
    ) -> Result<u64, GateError> {
        let result = bounded(
            self.storage_timeout,
            self.resources.conditional_update(id, expected_version, fields),
        )
        .await;

        match result {
            Ok(new_version) => Ok(new_version),
            Err(StoreError::NotFound) | Err(StoreError::EditConflict) => {
                Err(GateError::EditConflict)
            }
            Err(other) => Err(other.into()),
        }
    }
}
