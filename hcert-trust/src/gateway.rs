// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The remote trust-authority boundary.
//!
//! Transport is out of scope: implementations may sit on any HTTP client or
//! message bus. The contract the engine relies on is that fetches are
//! retriable and revocation chunks are addressable by index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keystore::TrustedKey;
use crate::rules::RuleSetting;

/// Error from a remote trust-authority call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The remote call itself failed (network, timeout, HTTP status).
    #[error("remote fetch failed: {0}")]
    Fetch(String),

    /// The remote answered with a response the engine cannot use.
    #[error("unexpected response: {0}")]
    Response(String),
}

/// Version descriptor returned by the revocation status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationDescriptor {
    /// Opaque identity of the target version.
    pub id: String,
    /// Monotonic version number.
    pub version: u64,
    /// Number of chunks that make up the update to this version.
    pub total_chunks: u32,
    /// Total number of revoked identifiers once the update is applied.
    pub total_entry_count: u64,
}

/// Payload of a single revocation chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkBody {
    /// A slice of the complete revoked-identifier list. Chunk 1 of a full
    /// download replaces the local set; later chunks extend it.
    Full(Vec<String>),
    /// A delta relative to the previously synchronized state.
    Delta {
        insertions: Vec<String>,
        deletions: Vec<String>,
    },
}

/// One page of a versioned revocation-list update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationChunk {
    /// Identity of the version this chunk belongs to.
    pub target_id: String,
    /// Version number this chunk belongs to.
    pub version: u64,
    /// 1-based index of this chunk.
    pub chunk_number: u32,
    /// Number of chunks in the update.
    pub total_chunks: u32,
    /// Total entry count once the update is applied.
    pub total_entry_count: u64,
    pub body: ChunkBody,
}

/// Remote authority for every source of trust material.
#[async_trait]
pub trait TrustGateway: Send + Sync + 'static {
    /// Fetch the complete issuer key directory.
    async fn fetch_key_directory(&self) -> Result<Vec<TrustedKey>, GatewayError>;

    /// Fetch the business-rule settings for a country.
    async fn fetch_rules(&self, country: &str) -> Result<Vec<RuleSetting>, GatewayError>;

    /// Query the revocation authority with the locally applied version.
    async fn revocation_status(&self, local_version: u64)
        -> Result<RevocationDescriptor, GatewayError>;

    /// Fetch one revocation chunk by index. Re-fetching the same index must
    /// return the same chunk for an unchanged target version.
    async fn revocation_chunk(
        &self,
        version: u64,
        chunk_number: u32,
    ) -> Result<RevocationChunk, GatewayError>;
}
