// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-country business-rule settings backed by a [`TrustCache`].
//!
//! Rule semantics are opaque to this crate; only fetch and cache behavior
//! is handled here. Evaluation happens behind the validation crate's rule
//! evaluator boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{Fetched, TrustCache, TrustCacheOptions, TrustFetcher};
use crate::error::{RefreshError, TrustError};
use crate::gateway::TrustGateway;
use crate::snapshot::SnapshotStore;

/// A single named rule setting, opaque to the trust engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetting {
    pub name: String,
    pub setting_type: String,
    pub value: String,
}

struct RuleFetcher {
    gateway: Arc<dyn TrustGateway>,
}

#[async_trait]
impl TrustFetcher for RuleFetcher {
    type Value = Vec<RuleSetting>;

    fn name(&self) -> &'static str {
        "rules"
    }

    async fn fetch(&self, partition: &str) -> Result<Fetched<Vec<RuleSetting>>, RefreshError> {
        let rules = self
            .gateway
            .fetch_rules(partition)
            .await
            .map_err(|e| RefreshError::Fetch(e.to_string()))?;
        debug!(country = partition, count = rules.len(), "fetched rule settings");
        Ok(Fetched::new(rules))
    }
}

/// Cached per-country rule settings. The partition key is the country code.
pub struct RulesRegistry {
    cache: TrustCache<RuleFetcher>,
}

impl RulesRegistry {
    pub fn new(
        gateway: Arc<dyn TrustGateway>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        options: TrustCacheOptions,
    ) -> Self {
        Self {
            cache: TrustCache::new(RuleFetcher { gateway }, snapshots, options),
        }
    }

    /// The rule settings for a country.
    pub async fn rules_for(&self, country: &str) -> Result<Arc<Vec<RuleSetting>>, TrustError> {
        self.cache.get(country).await
    }

    pub fn invalidate(&self, country: &str) {
        self.cache.invalidate(country);
    }

    pub fn dispose(&self) {
        self.cache.dispose();
    }
}
