// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Optional local persistence of trust-material snapshots.
//!
//! A snapshot store lets a provider come back after a restart with the last
//! known-good material instead of a mandatory network round trip. Stores are
//! best-effort collaborators: load and persist failures are logged by the
//! cache layer and never surfaced to validation callers.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// A serialized trust-material value plus the instant it was last refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSnapshot {
    /// Serialized value bytes (JSON).
    pub data: Vec<u8>,
    /// When the value was last refreshed from the remote authority.
    pub last_update: DateTime<Utc>,
}

/// A durable store keyed by partition name.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot for a partition, `None` when absent.
    async fn load(&self, partition: &str) -> Result<Option<PersistedSnapshot>, StoreError>;

    /// Persist the snapshot for a partition, replacing any previous one.
    async fn persist(&self, partition: &str, snapshot: PersistedSnapshot) -> Result<(), StoreError>;
}

/// In-memory snapshot store.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, PersistedSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, partition: &str) -> Result<Option<PersistedSnapshot>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(partition).cloned())
    }

    async fn persist(&self, partition: &str, snapshot: PersistedSnapshot) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(partition.to_string(), snapshot);
        Ok(())
    }
}
