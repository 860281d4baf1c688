// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Signature verification and the validation pipeline for HCERT
//! health-pass certificates.
//!
//! The wire codec lives in `hcert-common`, trust material (keys, rules,
//! revocation) in `hcert-trust`. This crate ties them together:
//! - the registered COSE algorithm table and per-algorithm verification
//! - raw-to-DER ECDSA signature re-packaging
//! - the staged pipeline behind [`CertificateValidator`] with its lenient
//!   `decode`, strict `verify` and full `validate` entry points.

pub mod algorithms;
pub mod der;
pub mod error;
pub mod orchestrator;
pub mod verifier;

pub use algorithms::{resolve_algorithm, CoseAlgorithm};
pub use error::ValidationError;
pub use orchestrator::{
    AcceptAllRules, CertificateValidator, DecodedCertificate, RuleEvaluator, RuleOutcome,
    ValidationReport, VerifiedCertificate,
};
pub use verifier::verify;
