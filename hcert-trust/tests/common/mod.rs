// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Scripted in-memory trust gateway shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hcert_trust::{
    ChunkBody, GatewayError, RevocationChunk, RevocationDescriptor, RuleSetting, TrustGateway,
    TrustedKey,
};

#[derive(Default)]
pub struct ScriptedGateway {
    pub keys: Mutex<Vec<TrustedKey>>,
    pub rules: Mutex<HashMap<String, Vec<RuleSetting>>>,
    pub descriptor: Mutex<Option<RevocationDescriptor>>,
    pub chunks: Mutex<HashMap<(u64, u32), RevocationChunk>>,
    pub key_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub chunk_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_descriptor(&self, descriptor: RevocationDescriptor) {
        *self.descriptor.lock().unwrap() = Some(descriptor);
    }

    pub fn add_chunk(&self, chunk: RevocationChunk) {
        self.chunks
            .lock()
            .unwrap()
            .insert((chunk.version, chunk.chunk_number), chunk);
    }
}

#[async_trait]
impl TrustGateway for ScriptedGateway {
    async fn fetch_key_directory(&self) -> Result<Vec<TrustedKey>, GatewayError> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.keys.lock().unwrap().clone())
    }

    async fn fetch_rules(&self, country: &str) -> Result<Vec<RuleSetting>, GatewayError> {
        self.rules
            .lock()
            .unwrap()
            .get(country)
            .cloned()
            .ok_or_else(|| GatewayError::Fetch(format!("no rules scripted for {country}")))
    }

    async fn revocation_status(
        &self,
        _local_version: u64,
    ) -> Result<RevocationDescriptor, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.descriptor
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::Fetch("no descriptor scripted".into()))
    }

    async fn revocation_chunk(
        &self,
        version: u64,
        chunk_number: u32,
    ) -> Result<RevocationChunk, GatewayError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        self.chunks
            .lock()
            .unwrap()
            .get(&(version, chunk_number))
            .cloned()
            .ok_or_else(|| {
                GatewayError::Fetch(format!("no chunk {chunk_number} scripted for v{version}"))
            })
    }
}

pub fn descriptor(id: &str, version: u64, total_chunks: u32, total_entry_count: u64) -> RevocationDescriptor {
    RevocationDescriptor {
        id: id.to_string(),
        version,
        total_chunks,
        total_entry_count,
    }
}

pub fn delta_chunk(
    id: &str,
    version: u64,
    chunk_number: u32,
    total_chunks: u32,
    total_entry_count: u64,
    insertions: &[&str],
    deletions: &[&str],
) -> RevocationChunk {
    RevocationChunk {
        target_id: id.to_string(),
        version,
        chunk_number,
        total_chunks,
        total_entry_count,
        body: ChunkBody::Delta {
            insertions: insertions.iter().map(|s| s.to_string()).collect(),
            deletions: deletions.iter().map(|s| s.to_string()).collect(),
        },
    }
}

pub fn full_chunk(
    id: &str,
    version: u64,
    chunk_number: u32,
    total_chunks: u32,
    total_entry_count: u64,
    members: &[&str],
) -> RevocationChunk {
    RevocationChunk {
        target_id: id.to_string(),
        version,
        chunk_number,
        total_chunks,
        total_entry_count,
        body: ChunkBody::Full(members.iter().map(|s| s.to_string()).collect()),
    }
}
