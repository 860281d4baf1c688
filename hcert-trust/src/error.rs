// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// Error produced by a single refresh operation.
///
/// Refresh results fan out to every caller that joined the in-flight
/// operation, so this type stays cheap to clone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// The underlying fetch (gateway call, store write) failed.
    #[error("refresh failed: {0}")]
    Fetch(String),

    /// The refresh was cancelled before completing.
    #[error("refresh cancelled")]
    Cancelled,
}

/// Errors surfaced by trust-material operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrustError {
    /// No value has ever been obtained for the partition and the refresh
    /// that would have produced one failed.
    #[error("no trust material available for '{partition}': {reason}")]
    NoTrustMaterialAvailable {
        /// Partition key the caller asked for.
        partition: String,
        /// The underlying refresh failure.
        reason: String,
    },

    /// The operation was cancelled, typically because the owning provider
    /// was disposed.
    #[error("operation cancelled")]
    Cancelled,

    /// A remote gateway call failed outside the cache refresh path.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// A local store operation failed.
    #[error("store error: {0}")]
    Store(String),
}

/// Error from a local persistence collaborator.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<StoreError> for TrustError {
    fn from(e: StoreError) -> Self {
        TrustError::Store(e.0)
    }
}
