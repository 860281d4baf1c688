// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Trust-material engine for HCERT validation.
//!
//! Every source of trust material (the issuer key directory, per-country
//! rule settings, the revocation set) is served through the same machinery:
//! a generic TTL + stale-while-revalidate [`cache::TrustCache`] whose
//! refreshes are deduplicated per partition by
//! [`single_flight::SingleFlight`]. The revocation set additionally runs a
//! versioned chunked-delta reconciliation against the remote authority.
//!
//! Remote transport and durable storage are collaborator traits
//! ([`gateway::TrustGateway`], [`snapshot::SnapshotStore`],
//! [`revocation::RevocationStore`]); in-memory implementations ship for
//! embedding and tests.

pub mod cache;
pub mod error;
pub mod gateway;
pub mod keystore;
pub mod revocation;
pub mod rules;
pub mod single_flight;
pub mod snapshot;

pub use cache::{CachedValue, Fetched, TrustCache, TrustCacheOptions, TrustFetcher};
pub use error::{RefreshError, StoreError, TrustError};
pub use gateway::{ChunkBody, GatewayError, RevocationChunk, RevocationDescriptor, TrustGateway};
pub use keystore::{EcParameters, KeyDirectory, KeyFamily, KeyStore, RsaParameters, TrustedKey};
pub use revocation::{
    MemoryRevocationStore, RevocationOptions, RevocationRegistry, RevocationState,
    RevocationStore, RevocationSyncEngine,
};
pub use rules::{RuleSetting, RulesRegistry};
pub use single_flight::SingleFlight;
pub use snapshot::{MemorySnapshotStore, PersistedSnapshot, SnapshotStore};
