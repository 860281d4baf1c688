// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Single-flight deduplication of asynchronous refresh operations.
//!
//! At most one operation runs per key; callers that arrive while one is in
//! flight receive a handle to the same shared future. The in-flight slot is
//! cleared when the operation completes, whatever the outcome, so the next
//! call starts fresh.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use crate::error::RefreshError;

/// Shared handle to an in-flight (or completed) refresh.
pub type RefreshHandle<T> = Shared<BoxFuture<'static, Result<T, RefreshError>>>;

type FlightMap<K, T> = HashMap<K, RefreshHandle<T>>;

/// Per-key deduplication of async operations.
///
/// The map lock is held only for slot lookup and insertion, never across an
/// await point.
pub struct SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    in_flight: Arc<Mutex<FlightMap<K, T>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the in-flight operation for `key`, or start a new one built by
    /// `make`.
    ///
    /// `make` is only invoked when no operation is in flight for the key.
    /// The returned handle can be awaited by any number of callers and can
    /// be polled from a spawned task for background completion.
    pub fn run_once<F>(&self, key: K, make: F) -> RefreshHandle<T>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T, RefreshError>>,
    {
        let mut slots = lock(&self.in_flight);

        if let Some(existing) = slots.get(&key) {
            return existing.clone();
        }

        let map = Arc::clone(&self.in_flight);
        let slot_key = key.clone();
        let inner = make();

        let handle = async move {
            let out = inner.await;
            // Clear the slot before handing out the result so the next
            // run_once after completion starts a fresh operation.
            lock(&map).remove(&slot_key);
            out
        }
        .boxed()
        .shared();

        slots.insert(key, handle.clone());
        handle
    }

    /// Number of operations currently in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<K, T>(map: &Mutex<FlightMap<K, T>>) -> std::sync::MutexGuard<'_, FlightMap<K, T>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
