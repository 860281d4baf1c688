// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Generic TTL + stale-while-revalidate cache for trust material.
//!
//! One `TrustCache` instance backs one source of trust material (key
//! directory, rule sets, revocation state), partitioned by a string key.
//! Refreshes are deduplicated per partition through [`SingleFlight`];
//! partitions refresh independently of each other.
//!
//! Locking discipline: the value table and the refresh-attempt table each
//! have their own mutex, held only for a map read or swap and never across
//! an await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RefreshError, TrustError};
use crate::single_flight::{RefreshHandle, SingleFlight};
use crate::snapshot::{PersistedSnapshot, SnapshotStore};

/// Configuration of a [`TrustCache`] instance.
#[derive(Debug, Clone)]
pub struct TrustCacheOptions {
    /// Age after which a cached value is considered stale and a refresh is
    /// attempted. Default: 24 hours.
    pub refresh_interval: Duration,
    /// Minimum time between refresh attempts for one partition, successful
    /// or not. Default: 5 minutes.
    pub min_refresh_interval: Duration,
    /// When true (the default), a stale value is returned immediately and
    /// the refresh proceeds in the background. When false, callers wait for
    /// the refresh and fall back to the stale value only if it fails.
    pub use_available_while_refreshing: bool,
}

impl Default for TrustCacheOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(24 * 60 * 60),
            min_refresh_interval: Duration::from_secs(5 * 60),
            use_available_while_refreshing: true,
        }
    }
}

/// A freshly fetched value, optionally with an explicit expiration supplied
/// by the source.
pub struct Fetched<T> {
    pub value: T,
    pub expires_at: Option<DateTime<Utc>>,
}

impl<T> Fetched<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }
}

/// Produces fresh trust material for a partition.
#[async_trait]
pub trait TrustFetcher: Send + Sync + 'static {
    type Value: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Stable name of this material source; namespaces snapshot keys and
    /// log lines.
    fn name(&self) -> &'static str;

    async fn fetch(&self, partition: &str) -> Result<Fetched<Self::Value>, RefreshError>;
}

/// A cached trust-material value for one partition.
#[derive(Debug)]
pub struct CachedValue<T> {
    pub value: Arc<T>,
    /// When the value was last successfully refreshed.
    pub last_update: DateTime<Utc>,
    /// Explicit expiration supplied by the source, if any.
    pub expires_at: Option<DateTime<Utc>>,
    pub partition: String,
}

// Manual `Clone` impl: the value is held behind `Arc`, so a `CachedValue`
// clones without requiring `T: Clone` (the derived impl would over-constrain).
impl<T> Clone for CachedValue<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            last_update: self.last_update,
            expires_at: self.expires_at,
            partition: self.partition.clone(),
        }
    }
}

impl<T> CachedValue<T> {
    fn is_stale(&self, now: DateTime<Utc>, refresh_interval: Duration) -> bool {
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return true;
            }
        }
        match now.signed_duration_since(self.last_update).to_std() {
            Ok(age) => age > refresh_interval,
            // A last_update in the future is not stale.
            Err(_) => false,
        }
    }
}

/// TTL + stale-while-revalidate cache over a [`TrustFetcher`].
pub struct TrustCache<F: TrustFetcher> {
    fetcher: Arc<F>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    options: TrustCacheOptions,
    values: Arc<Mutex<HashMap<String, CachedValue<F::Value>>>>,
    attempts: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    flight: SingleFlight<String, Arc<F::Value>>,
    cancel: CancellationToken,
}

impl<F: TrustFetcher> TrustCache<F> {
    pub fn new(
        fetcher: F,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        options: TrustCacheOptions,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            snapshots,
            options,
            values: Arc::new(Mutex::new(HashMap::new())),
            attempts: Arc::new(Mutex::new(HashMap::new())),
            flight: SingleFlight::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Get the trust material for a partition.
    ///
    /// The first load for a partition is synchronous: memory, then the
    /// snapshot store, then a blocking refresh. Later calls serve the
    /// cached value and refresh according to [`TrustCacheOptions`].
    pub async fn get(&self, partition: &str) -> Result<Arc<F::Value>, TrustError> {
        if self.cancel.is_cancelled() {
            return Err(TrustError::Cancelled);
        }

        let mut cached = self.cached(partition);
        if cached.is_none() {
            cached = self.load_snapshot(partition).await;
        }

        let Some(cached) = cached else {
            let handle = self.trigger_refresh(partition);
            return match handle.await {
                Ok(value) => Ok(value),
                Err(err) => Err(TrustError::NoTrustMaterialAvailable {
                    partition: partition.to_string(),
                    reason: err.to_string(),
                }),
            };
        };

        let now = Utc::now();
        if cached.is_stale(now, self.options.refresh_interval) && self.cooldown_elapsed(partition, now) {
            let handle = self.trigger_refresh(partition);

            if self.options.use_available_while_refreshing {
                tokio::spawn(handle);
                return Ok(cached.value);
            }

            match handle.await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        source = self.fetcher.name(),
                        partition,
                        error = %err,
                        "refresh failed, serving stale trust material"
                    );
                    return Ok(cached.value);
                }
            }
        }

        Ok(cached.value)
    }

    /// The cached value for a partition, without triggering any refresh.
    pub fn cached(&self, partition: &str) -> Option<CachedValue<F::Value>> {
        lock(&self.values).get(partition).cloned()
    }

    /// Drop the cached value for a partition. The next `get` reloads it.
    pub fn invalidate(&self, partition: &str) {
        lock(&self.values).remove(partition);
        lock(&self.attempts).remove(partition);
    }

    /// Cancel in-flight refreshes and reject further use.
    ///
    /// Callers already awaiting a refresh observe the cancellation and fall
    /// back to their last-good value where one exists.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    fn cooldown_elapsed(&self, partition: &str, now: DateTime<Utc>) -> bool {
        match lock(&self.attempts).get(partition) {
            None => true,
            Some(last_attempt) => match now.signed_duration_since(*last_attempt).to_std() {
                Ok(since) => since >= self.options.min_refresh_interval,
                Err(_) => false,
            },
        }
    }

    fn snapshot_key(&self, partition: &str) -> String {
        format!("{}/{partition}", self.fetcher.name())
    }

    async fn load_snapshot(&self, partition: &str) -> Option<CachedValue<F::Value>> {
        let store = self.snapshots.as_ref()?;

        let snapshot = match store.load(&self.snapshot_key(partition)).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(err) => {
                debug!(
                    source = self.fetcher.name(),
                    partition,
                    error = %err,
                    "snapshot load failed"
                );
                return None;
            }
        };

        match serde_json::from_slice::<F::Value>(&snapshot.data) {
            Ok(value) => {
                let cached = CachedValue {
                    value: Arc::new(value),
                    last_update: snapshot.last_update,
                    expires_at: None,
                    partition: partition.to_string(),
                };
                let mut values = lock(&self.values);
                // A concurrent refresh may have landed while the snapshot
                // was being read; keep whichever is already present.
                let entry = values
                    .entry(partition.to_string())
                    .or_insert_with(|| cached.clone());
                Some(entry.clone())
            }
            Err(err) => {
                warn!(
                    source = self.fetcher.name(),
                    partition,
                    error = %err,
                    "snapshot is unreadable, ignoring it"
                );
                None
            }
        }
    }

    fn trigger_refresh(&self, partition: &str) -> RefreshHandle<Arc<F::Value>> {
        let key = partition.to_string();
        self.flight.run_once(key.clone(), || {
            let fetcher = Arc::clone(&self.fetcher);
            let values = Arc::clone(&self.values);
            let attempts = Arc::clone(&self.attempts);
            let snapshots = self.snapshots.clone();
            let cancel = self.cancel.clone();
            let snapshot_key = self.snapshot_key(&key);
            let partition = key;

            async move {
                lock(&attempts).insert(partition.clone(), Utc::now());

                let fetched = tokio::select! {
                    _ = cancel.cancelled() => return Err(RefreshError::Cancelled),
                    result = fetcher.fetch(&partition) => result?,
                };

                let value = Arc::new(fetched.value);
                let cached = CachedValue {
                    value: Arc::clone(&value),
                    last_update: Utc::now(),
                    expires_at: fetched.expires_at,
                    partition: partition.clone(),
                };
                lock(&values).insert(partition.clone(), cached);

                if let Some(store) = snapshots {
                    persist_snapshot(fetcher.name(), store, &snapshot_key, value.as_ref()).await;
                }

                Ok(value)
            }
            .boxed()
        })
    }
}

impl<F: TrustFetcher> Drop for TrustCache<F> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Persist a refreshed value. Failures are logged and never surfaced.
async fn persist_snapshot<T: Serialize>(
    source: &'static str,
    store: Arc<dyn SnapshotStore>,
    key: &str,
    value: &T,
) {
    let data = match serde_json::to_vec(value) {
        Ok(data) => data,
        Err(err) => {
            warn!(source, key, error = %err, "snapshot serialization failed");
            return;
        }
    };

    let snapshot = PersistedSnapshot {
        data,
        last_update: Utc::now(),
    };

    if let Err(err) = store.persist(key, snapshot).await {
        warn!(source, key, error = %err, "snapshot persistence failed");
    }
}

fn lock<K, V>(map: &Mutex<HashMap<K, V>>) -> MutexGuard<'_, HashMap<K, V>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
