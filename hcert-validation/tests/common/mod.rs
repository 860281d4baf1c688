// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared fixtures: synthetic signed certificates and a fixed-directory
//! trust gateway.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use hcert_common::base45;
use hcert_trust::{
    EcParameters, GatewayError, KeyFamily, RevocationChunk, RevocationDescriptor, RuleSetting,
    TrustGateway, TrustedKey,
};
use minicbor::Encoder;
use p256::ecdsa::signature::Signer as _;
use p256::elliptic_curve::sec1::ToEncodedPoint as _;

pub const TEST_KID: &[u8] = b"test-kid";
pub const TEST_UVCI: &str = "URN:UVCI:01:IT:TESTCERT#A";

/// A trusted key carrying the EC parameters of a P-256 verifying key.
pub fn trusted_key_p256(kid: &[u8], country: &str, vk: &p256::ecdsa::VerifyingKey) -> TrustedKey {
    let point = vk.to_encoded_point(false);
    TrustedKey {
        kid: kid.to_vec(),
        country: country.to_string(),
        family: KeyFamily::Ec,
        ec: Some(EcParameters {
            curve: "P-256".to_string(),
            x: point.x().map(|x| x.to_vec()).unwrap_or_default(),
            y: point.y().map(|y| y.to_vec()).unwrap_or_default(),
        }),
        rsa: None,
        certificate: None,
    }
}

/// CBOR certificate payload with one vaccination entry.
pub fn cert_payload(ci: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    enc.map(4).unwrap();
    enc.str("ver").unwrap();
    enc.str("1.3.0").unwrap();
    enc.str("nam").unwrap();
    enc.map(2).unwrap();
    enc.str("fn").unwrap();
    enc.str("Rossi").unwrap();
    enc.str("fnt").unwrap();
    enc.str("ROSSI").unwrap();
    enc.str("dob").unwrap();
    enc.str("1980-01-01").unwrap();
    enc.str("v").unwrap();
    enc.array(1).unwrap();
    enc.map(8).unwrap();
    enc.str("tg").unwrap();
    enc.str("840539006").unwrap();
    enc.str("dn").unwrap();
    enc.u32(2).unwrap();
    enc.str("sd").unwrap();
    enc.u32(2).unwrap();
    enc.str("dt").unwrap();
    enc.str("2021-06-11").unwrap();
    enc.str("co").unwrap();
    enc.str("IT").unwrap();
    enc.str("is").unwrap();
    enc.str("Ministero della Salute").unwrap();
    enc.str("mp").unwrap();
    enc.str("EU/1/20/1528").unwrap();
    enc.str("ci").unwrap();
    enc.str(ci).unwrap();
    buf
}

/// CWT payload embedding `cert` under the health-certificate claim.
pub fn cwt_payload(iss: &str, iat: i64, exp: i64, cert: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    enc.map(4).unwrap();
    enc.i64(1).unwrap();
    enc.str(iss).unwrap();
    enc.i64(6).unwrap();
    enc.i64(iat).unwrap();
    enc.i64(4).unwrap();
    enc.i64(exp).unwrap();
    enc.i64(-260).unwrap();
    enc.map(1).unwrap();
    enc.i64(1).unwrap();
    let mut dec = minicbor::Decoder::new(cert);
    let value = hcert_common::header_map::decode_value(&mut dec).unwrap();
    hcert_common::header_map::encode_value(&value, &mut enc).unwrap();
    buf
}

/// Protected header map `{1: alg, 4: kid}`.
pub fn protected_header(alg: i64, kid: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    enc.map(2).unwrap();
    enc.i64(1).unwrap();
    enc.i64(alg).unwrap();
    enc.i64(4).unwrap();
    enc.bytes(kid).unwrap();
    buf
}

/// Sig_structure bytes for an embedded payload.
pub fn sig_structure(protected: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut enc = Encoder::new(&mut out);
    enc.array(4).unwrap();
    enc.str("Signature1").unwrap();
    enc.bytes(protected).unwrap();
    enc.bytes(&[]).unwrap();
    enc.bytes(payload).unwrap();
    out
}

/// Assemble a tagged COSE_Sign1 from its parts.
pub fn assemble_cose(protected: &[u8], payload: &[u8], signature: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut enc = Encoder::new(&mut out);
    enc.tag(minicbor::data::Tag::new(18)).unwrap();
    enc.array(4).unwrap();
    enc.bytes(protected).unwrap();
    enc.map(0).unwrap();
    enc.bytes(payload).unwrap();
    enc.bytes(signature).unwrap();
    out
}

/// Sign a CWT payload with ES256 and assemble the COSE_Sign1.
pub fn sign_es256(payload: &[u8], sk: &p256::ecdsa::SigningKey, kid: &[u8]) -> Vec<u8> {
    let protected = protected_header(-7, kid);
    let message = sig_structure(&protected, payload);
    let sig: p256::ecdsa::Signature = sk.sign(&message);
    assemble_cose(&protected, payload, &sig.to_bytes())
}

/// Deflate + base45 + prefix.
pub fn to_wire(cose: &[u8]) -> String {
    let mut z = ZlibEncoder::new(Vec::new(), Compression::default());
    z.write_all(cose).unwrap();
    let compressed = z.finish().unwrap();
    format!("HC1:{}", base45::encode(&compressed))
}

/// A complete signed wire-format certificate.
pub fn signed_wire(sk: &p256::ecdsa::SigningKey, iss: &str, iat: i64, exp: i64, ci: &str) -> String {
    let cert = cert_payload(ci);
    let cwt = cwt_payload(iss, iat, exp, &cert);
    to_wire(&sign_es256(&cwt, sk, TEST_KID))
}

/// Gateway serving a fixed key directory plus optional scripted rules and
/// revocation data.
#[derive(Default)]
pub struct FixedGateway {
    pub keys: Vec<TrustedKey>,
    pub rules: Mutex<HashMap<String, Vec<RuleSetting>>>,
    pub descriptor: Mutex<Option<RevocationDescriptor>>,
    pub chunks: Mutex<HashMap<(u64, u32), RevocationChunk>>,
}

impl FixedGateway {
    pub fn with_keys(keys: Vec<TrustedKey>) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }
}

#[async_trait]
impl TrustGateway for FixedGateway {
    async fn fetch_key_directory(&self) -> Result<Vec<TrustedKey>, GatewayError> {
        Ok(self.keys.clone())
    }

    async fn fetch_rules(&self, country: &str) -> Result<Vec<RuleSetting>, GatewayError> {
        self.rules
            .lock()
            .unwrap()
            .get(country)
            .cloned()
            .ok_or_else(|| GatewayError::Fetch(format!("no rules for {country}")))
    }

    async fn revocation_status(
        &self,
        _local_version: u64,
    ) -> Result<RevocationDescriptor, GatewayError> {
        self.descriptor
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::Fetch("no revocation data".into()))
    }

    async fn revocation_chunk(
        &self,
        version: u64,
        chunk_number: u32,
    ) -> Result<RevocationChunk, GatewayError> {
        self.chunks
            .lock()
            .unwrap()
            .get(&(version, chunk_number))
            .cloned()
            .ok_or_else(|| GatewayError::Fetch(format!("no chunk {chunk_number} for v{version}")))
    }
}
