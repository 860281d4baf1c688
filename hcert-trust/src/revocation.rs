// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Versioned, chunked synchronization of the certificate revocation set.
//!
//! The remote authority publishes revocation updates as a target version
//! descriptor plus a sequence of chunks, each carrying either a slice of the
//! full revoked-identifier list or an insertions/deletions delta. The engine
//! applies chunks idempotently and commits the local version only once every
//! chunk of the target has been applied.
//!
//! Identifiers are never stored in the clear: membership is tracked over a
//! one-way digest of each identifier.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cache::{Fetched, TrustCache, TrustCacheOptions, TrustFetcher};
use crate::error::{RefreshError, StoreError, TrustError};
use crate::gateway::{ChunkBody, RevocationChunk, TrustGateway};

/// The revocation set is a single partition.
const REVOCATION_PARTITION: &str = "blacklist";

/// Retarget-while-downloading is expected to be rare; more than this many
/// restarts in one sync pass means the authority is flapping.
const MAX_RETARGETS_PER_SYNC: u32 = 3;

/// Synchronization state of the local revocation set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationState {
    /// Version the local set fully reflects.
    pub local_version: u64,
    /// Identity of the fully applied version.
    pub local_version_id: String,
    /// Version currently being downloaded.
    pub target_version: u64,
    /// Identity of the version currently being downloaded.
    pub target_version_id: String,
    /// Highest chunk of the target applied so far.
    pub last_chunk_applied: u32,
    /// Number of chunks in the target version.
    pub total_chunks: u32,
    /// Entry count of the target version.
    pub total_entry_count: u64,
    /// When the authority was last queried.
    pub last_check: Option<DateTime<Utc>>,
}

impl RevocationState {
    /// True when every chunk of the target version has been applied.
    pub fn is_complete(&self) -> bool {
        self.last_chunk_applied >= self.total_chunks
    }
}

/// Durable storage of the hashed revocation set and its sync state.
#[async_trait]
pub trait RevocationStore: Send + Sync + 'static {
    /// Test membership of a hashed identifier.
    async fn contains(&self, member: &str) -> Result<bool, StoreError>;

    /// Insert hashed identifiers, returning how many were newly added.
    /// Already-present members are skipped, not an error.
    async fn insert(&self, members: &[String]) -> Result<usize, StoreError>;

    /// Remove hashed identifiers, returning how many were actually present.
    async fn remove(&self, members: &[String]) -> Result<usize, StoreError>;

    /// Drop every member.
    async fn clear(&self) -> Result<(), StoreError>;

    async fn load_state(&self) -> Result<Option<RevocationState>, StoreError>;

    async fn save_state(&self, state: &RevocationState) -> Result<(), StoreError>;
}

/// In-memory revocation store.
#[derive(Default)]
pub struct MemoryRevocationStore {
    members: Mutex<HashSet<String>>,
    state: Mutex<Option<RevocationState>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members currently stored.
    pub fn len(&self) -> usize {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn contains(&self, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(member))
    }

    async fn insert(&self, members: &[String]) -> Result<usize, StoreError> {
        let mut set = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(members
            .iter()
            .filter(|m| set.insert((*m).clone()))
            .count())
    }

    async fn remove(&self, members: &[String]) -> Result<usize, StoreError> {
        let mut set = self.members.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(members.iter().filter(|m| set.remove(*m)).count())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn load_state(&self) -> Result<Option<RevocationState>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save_state(&self, state: &RevocationState) -> Result<(), StoreError> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        Ok(())
    }
}

/// Configuration of the revocation sync engine.
#[derive(Debug, Clone)]
pub struct RevocationOptions {
    /// Maximum identifiers written to the store in one operation.
    pub batch_size: usize,
    /// When true, a deletion that matches no stored entry fails the chunk
    /// instead of being logged as a mismatch.
    pub strict_deletions: bool,
}

impl Default for RevocationOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            strict_deletions: false,
        }
    }
}

/// Chunked delta-reconciliation state machine over a [`RevocationStore`].
pub struct RevocationSyncEngine {
    gateway: Arc<dyn TrustGateway>,
    store: Arc<dyn RevocationStore>,
    options: RevocationOptions,
    /// Serializes state read-modify-write cycles across store awaits.
    op_lock: tokio::sync::Mutex<()>,
}

impl RevocationSyncEngine {
    pub fn new(
        gateway: Arc<dyn TrustGateway>,
        store: Arc<dyn RevocationStore>,
        options: RevocationOptions,
    ) -> Self {
        Self {
            gateway,
            store,
            options,
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// One-way digest of a revocable identifier, as stored in the set.
    pub fn hash_identifier(identifier: &str) -> String {
        let digest = Sha256::digest(identifier.as_bytes());
        BASE64.encode(digest)
    }

    /// Whether `identifier` is in the revocation set.
    pub async fn contains(&self, identifier: &str) -> Result<bool, TrustError> {
        let member = Self::hash_identifier(identifier);
        Ok(self.store.contains(&member).await?)
    }

    /// The current sync state.
    pub async fn state(&self) -> Result<RevocationState, TrustError> {
        Ok(self.store.load_state().await?.unwrap_or_default())
    }

    /// Query the authority and adopt a new target version if one appeared.
    ///
    /// A changed target identity abandons any in-progress download: chunk
    /// tracking restarts from zero.
    pub async fn check_for_updates(&self) -> Result<RevocationState, TrustError> {
        let _guard = self.op_lock.lock().await;
        let mut state = self.store.load_state().await?.unwrap_or_default();

        let descriptor = self
            .gateway
            .revocation_status(state.local_version)
            .await
            .map_err(|e| TrustError::Gateway(e.to_string()))?;

        if descriptor.id != state.target_version_id {
            info!(
                target_id = %descriptor.id,
                target_version = descriptor.version,
                total_chunks = descriptor.total_chunks,
                "adopting new revocation target"
            );
            state.target_version_id = descriptor.id;
            state.target_version = descriptor.version;
            state.total_chunks = descriptor.total_chunks;
            state.total_entry_count = descriptor.total_entry_count;
            state.last_chunk_applied = 0;
        } else {
            // Same target: the authority may still have adjusted its chunk
            // accounting.
            state.target_version = descriptor.version;
            state.total_chunks = descriptor.total_chunks;
            state.total_entry_count = descriptor.total_entry_count;
        }

        state.last_check = Some(Utc::now());
        self.store.save_state(&state).await?;
        Ok(state)
    }

    /// Apply one chunk to the local set.
    ///
    /// Re-applying an already-applied chunk is harmless: duplicate inserts
    /// are skipped and progress never regresses.
    pub async fn apply_chunk(&self, chunk: &RevocationChunk) -> Result<RevocationState, TrustError> {
        let _guard = self.op_lock.lock().await;
        let mut state = self.store.load_state().await?.unwrap_or_default();

        if chunk.target_id != state.target_version_id {
            if chunk.chunk_number > 1 {
                // The authority moved to a new version mid-download. The
                // partial progress belongs to the abandoned target; restart
                // the download against the new one.
                warn!(
                    chunk_target = %chunk.target_id,
                    expected = %state.target_version_id,
                    chunk = chunk.chunk_number,
                    "revocation target changed mid-download, discarding progress"
                );
                adopt_target(&mut state, chunk);
                self.store.save_state(&state).await?;
                return Ok(state);
            }
            // Chunk 1 of a version we have not seen: adopt it and continue.
            adopt_target(&mut state, chunk);
        }

        match &chunk.body {
            ChunkBody::Full(members) => {
                // Chunk 1 of a full download replaces the set outright.
                if chunk.chunk_number == 1 && state.last_chunk_applied == 0 {
                    self.store.clear().await?;
                }
                self.insert_members(members).await?;
            }
            ChunkBody::Delta {
                insertions,
                deletions,
            } => {
                self.insert_members(insertions).await?;
                self.remove_members(deletions).await?;
            }
        }

        state.last_chunk_applied = state.last_chunk_applied.max(chunk.chunk_number);
        state.total_entry_count = chunk.total_entry_count;

        if state.total_chunks > 0 && state.is_complete() {
            state.local_version = state.target_version;
            state.local_version_id = state.target_version_id.clone();
            info!(
                version = state.local_version,
                entries = state.total_entry_count,
                "revocation set synchronized"
            );
        }

        self.store.save_state(&state).await?;
        Ok(state)
    }

    /// Run a status check and download chunks until the local set matches
    /// the target version.
    pub async fn sync(&self) -> Result<RevocationState, TrustError> {
        let mut state = self.check_for_updates().await?;
        let mut retargets = 0u32;

        while !state.is_complete() {
            let next = state.last_chunk_applied + 1;
            let chunk = self
                .gateway
                .revocation_chunk(state.target_version, next)
                .await
                .map_err(|e| TrustError::Gateway(e.to_string()))?;

            let target_before = state.target_version_id.clone();
            state = self.apply_chunk(&chunk).await?;

            if state.target_version_id != target_before {
                retargets += 1;
                if retargets > MAX_RETARGETS_PER_SYNC {
                    return Err(TrustError::Gateway(
                        "revocation target kept changing mid-download".into(),
                    ));
                }
            }
        }

        Ok(state)
    }

    async fn insert_members(&self, identifiers: &[String]) -> Result<(), TrustError> {
        for batch in hashed(identifiers).chunks(self.options.batch_size.max(1)) {
            let inserted = self.store.insert(batch).await?;
            let skipped = batch.len() - inserted;
            if skipped > 0 {
                debug!(skipped, "skipped duplicate revocation entries");
            }
        }
        Ok(())
    }

    async fn remove_members(&self, identifiers: &[String]) -> Result<(), TrustError> {
        for batch in hashed(identifiers).chunks(self.options.batch_size.max(1)) {
            let removed = self.store.remove(batch).await?;
            let missing = batch.len() - removed;
            if missing > 0 {
                warn!(missing, "deletion of revocation entries with no matching member");
                if self.options.strict_deletions {
                    return Err(TrustError::Store(format!(
                        "{missing} deletions had no matching revocation entry"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn adopt_target(state: &mut RevocationState, chunk: &RevocationChunk) {
    state.target_version_id = chunk.target_id.clone();
    state.target_version = chunk.version;
    state.total_chunks = chunk.total_chunks;
    state.total_entry_count = chunk.total_entry_count;
    state.last_chunk_applied = 0;
}

fn hashed(identifiers: &[String]) -> Vec<String> {
    identifiers
        .iter()
        .map(|id| RevocationSyncEngine::hash_identifier(id))
        .collect()
}

struct RevocationFetcher {
    engine: Arc<RevocationSyncEngine>,
}

#[async_trait]
impl TrustFetcher for RevocationFetcher {
    type Value = RevocationState;

    fn name(&self) -> &'static str {
        "revocation"
    }

    async fn fetch(&self, _partition: &str) -> Result<Fetched<RevocationState>, RefreshError> {
        let state = self.engine.sync().await.map_err(|e| match e {
            TrustError::Cancelled => RefreshError::Cancelled,
            other => RefreshError::Fetch(other.to_string()),
        })?;
        Ok(Fetched::new(state))
    }
}

/// Revocation set with cache-driven refresh.
///
/// `update` goes through the [`TrustCache`] machinery, so concurrent callers
/// share one sync pass and the refresh interval / cooldown rules apply.
/// State persistence is the revocation store's own job, so no snapshot
/// collaborator is wired in.
pub struct RevocationRegistry {
    engine: Arc<RevocationSyncEngine>,
    cache: TrustCache<RevocationFetcher>,
}

impl RevocationRegistry {
    pub fn new(
        gateway: Arc<dyn TrustGateway>,
        store: Arc<dyn RevocationStore>,
        cache_options: TrustCacheOptions,
        options: RevocationOptions,
    ) -> Self {
        let engine = Arc::new(RevocationSyncEngine::new(gateway, store, options));
        let fetcher = RevocationFetcher {
            engine: Arc::clone(&engine),
        };
        Self {
            engine,
            cache: TrustCache::new(fetcher, None, cache_options),
        }
    }

    /// Bring the revocation set up to date according to cache policy.
    pub async fn update(&self) -> Result<Arc<RevocationState>, TrustError> {
        self.cache.get(REVOCATION_PARTITION).await
    }

    /// Whether `identifier` is in the revocation set. Does not refresh.
    pub async fn is_revoked(&self, identifier: &str) -> Result<bool, TrustError> {
        self.engine.contains(identifier).await
    }

    /// Direct access to the sync engine.
    pub fn engine(&self) -> &Arc<RevocationSyncEngine> {
        &self.engine
    }

    pub fn dispose(&self) {
        self.cache.dispose();
    }
}
