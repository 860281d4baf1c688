// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire codec for HCERT health-pass certificates.
//!
//! This crate covers the transport-to-structure half of certificate
//! processing:
//! - `"HC1:"` prefix handling, base45 decoding and zlib inflation
//! - COSE_Sign1 envelope parsing and Sig_structure encoding
//! - CWT claims extraction (issuer, issued-at, expiration, embedded payload)
//! - the typed certificate payload model
//!
//! Signature verification and trust-material handling live in the sibling
//! `hcert-validation` and `hcert-trust` crates.

pub mod base45;
pub mod certificate;
pub mod claims;
pub mod decompress;
pub mod envelope;
pub mod error;
pub mod header_map;

pub use certificate::{Certificate, CertificateEntry};
pub use claims::ClaimsSet;
pub use envelope::{decode, SignedEnvelope};
pub use error::DecodeError;
