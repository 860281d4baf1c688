// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Issuer signing-key directory backed by a [`TrustCache`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{Fetched, TrustCache, TrustCacheOptions, TrustFetcher};
use crate::error::{RefreshError, TrustError};
use crate::gateway::TrustGateway;
use crate::snapshot::SnapshotStore;

/// The key directory is a single partition.
const DIRECTORY_PARTITION: &str = "directory";

/// Algorithm family a trusted key supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyFamily {
    Ec,
    Rsa,
}

/// Elliptic-curve public key parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcParameters {
    /// Curve name, e.g. `"P-256"`.
    pub curve: String,
    /// Big-endian X coordinate.
    pub x: Vec<u8>,
    /// Big-endian Y coordinate.
    pub y: Vec<u8>,
}

/// RSA public key parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaParameters {
    /// Big-endian modulus.
    pub modulus: Vec<u8>,
    /// Big-endian public exponent.
    pub exponent: Vec<u8>,
}

/// An issuer signing key from the trust directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedKey {
    /// Key identifier matched against the COSE `kid` header.
    pub kid: Vec<u8>,
    /// Issuing country of the key.
    pub country: String,
    pub family: KeyFamily,
    pub ec: Option<EcParameters>,
    pub rsa: Option<RsaParameters>,
    /// Raw DER certificate, when the directory carries one.
    pub certificate: Option<Vec<u8>>,
}

impl TrustedKey {
    /// The kid in its conventional base64 display form.
    pub fn kid_b64(&self) -> String {
        BASE64.encode(&self.kid)
    }
}

/// The full downloaded key directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyDirectory {
    pub keys: Vec<TrustedKey>,
}

impl KeyDirectory {
    /// Find a key by kid, preferring an issuer-country match.
    pub fn find(&self, kid: &[u8], country: Option<&str>) -> Option<&TrustedKey> {
        if let Some(country) = country {
            if let Some(key) = self
                .keys
                .iter()
                .find(|k| k.kid == kid && k.country.eq_ignore_ascii_case(country))
            {
                return Some(key);
            }
        }
        self.keys.iter().find(|k| k.kid == kid)
    }
}

struct KeyDirectoryFetcher {
    gateway: Arc<dyn TrustGateway>,
}

#[async_trait]
impl TrustFetcher for KeyDirectoryFetcher {
    type Value = KeyDirectory;

    fn name(&self) -> &'static str {
        "keys"
    }

    async fn fetch(&self, _partition: &str) -> Result<Fetched<KeyDirectory>, RefreshError> {
        let keys = self
            .gateway
            .fetch_key_directory()
            .await
            .map_err(|e| RefreshError::Fetch(e.to_string()))?;
        debug!(count = keys.len(), "fetched key directory");
        Ok(Fetched::new(KeyDirectory { keys }))
    }
}

/// Cached issuer key directory with `(kid, country)` resolution.
pub struct KeyStore {
    cache: TrustCache<KeyDirectoryFetcher>,
}

impl KeyStore {
    pub fn new(
        gateway: Arc<dyn TrustGateway>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        options: TrustCacheOptions,
    ) -> Self {
        Self {
            cache: TrustCache::new(KeyDirectoryFetcher { gateway }, snapshots, options),
        }
    }

    /// Resolve a signing key by kid, searching `(kid, country)` first and
    /// `kid` alone as a fallback.
    pub async fn resolve(
        &self,
        kid: &[u8],
        country: Option<&str>,
    ) -> Result<Option<TrustedKey>, TrustError> {
        let directory = self.cache.get(DIRECTORY_PARTITION).await?;
        Ok(directory.find(kid, country).cloned())
    }

    /// Force the directory to be dropped and reloaded on next use.
    pub fn invalidate(&self) {
        self.cache.invalidate(DIRECTORY_PARTITION);
    }

    /// Cancel in-flight refreshes.
    pub fn dispose(&self) {
        self.cache.dispose();
    }
}
