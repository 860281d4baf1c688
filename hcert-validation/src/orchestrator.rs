// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The staged validation pipeline.
//!
//! Decode → LocateKey → VerifySignature → CheckExpiration →
//! [CheckBlacklist] → [EvaluateRules].
//!
//! Two entry points share the pipeline with different failure propagation:
//! the lenient [`CertificateValidator::decode`] captures signature and
//! signer-resolution failures in the result object, while the strict
//! [`CertificateValidator::verify`] returns them as typed errors.
//! [`CertificateValidator::validate`] extends strict verification with
//! revocation and business-rule outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hcert_common::{Certificate, ClaimsSet, SignedEnvelope};
use hcert_trust::{KeyStore, RevocationRegistry, RuleSetting, RulesRegistry};
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::verifier;

/// Outcome of business-rule evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Every applicable rule accepted the certificate.
    Passed,
    /// At least one rule rejected the certificate.
    Failed { reason: String },
    /// No rule evaluator or rule settings were available.
    NotEvaluated,
}

/// Evaluates country business rules over a decoded certificate.
///
/// Rule semantics are an external concern; implementations receive the
/// opaque settings fetched for the issuing country.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    async fn evaluate(&self, certificate: &Certificate, settings: &[RuleSetting]) -> RuleOutcome;
}

/// Rule evaluator that accepts every certificate.
pub struct AcceptAllRules;

#[async_trait]
impl RuleEvaluator for AcceptAllRules {
    async fn evaluate(&self, _certificate: &Certificate, _settings: &[RuleSetting]) -> RuleOutcome {
        RuleOutcome::Passed
    }
}

/// Lenient decode result.
///
/// Always produced for well-formed input; signature problems are captured
/// in [`signature_error`](Self::signature_error) rather than returned as
/// errors. Expiration is exposed for the caller to check against a clock of
/// its choosing (see [`Self::is_expired_at`]).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCertificate {
    pub certificate: Certificate,
    pub issuer: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// True when a trusted key was found and the signature verified.
    pub signature_valid: bool,
    /// The captured failure when `signature_valid` is false.
    pub signature_error: Option<ValidationError>,
}

impl DecodedCertificate {
    /// Whether the claims expiration lies before `clock`. A missing
    /// expiration counts as not expired.
    pub fn is_expired_at(&self, clock: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= clock)
    }
}

/// Strict verification result: decode succeeded, the signature verified and
/// the certificate was not expired at the validation instant.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedCertificate {
    pub certificate: Certificate,
    pub issuer: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Full validation result: strict verification plus revocation and rule
/// outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub certificate: Certificate,
    pub issuer: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether any of the certificate's identifiers is revoked. `None` when
    /// no revocation registry is wired in.
    pub revoked: Option<bool>,
    pub rules: RuleOutcome,
}

/// Composes the codec, the signature verifier and the trust-material
/// providers into the public validation operations.
pub struct CertificateValidator {
    keys: Arc<KeyStore>,
    revocations: Option<Arc<RevocationRegistry>>,
    rules: Option<Arc<RulesRegistry>>,
    rule_evaluator: Option<Arc<dyn RuleEvaluator>>,
}

impl CertificateValidator {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            revocations: None,
            rules: None,
            rule_evaluator: None,
        }
    }

    /// Wire in a revocation registry; `validate` will report revocation.
    pub fn with_revocations(mut self, revocations: Arc<RevocationRegistry>) -> Self {
        self.revocations = Some(revocations);
        self
    }

    /// Wire in rule settings and an evaluator; `validate` will report the
    /// rule outcome.
    pub fn with_rules(mut self, rules: Arc<RulesRegistry>, evaluator: Arc<dyn RuleEvaluator>) -> Self {
        self.rules = Some(rules);
        self.rule_evaluator = Some(evaluator);
        self
    }

    /// Lenient decode: signature problems are captured in the result.
    ///
    /// Format errors and missing trust material still propagate; without a
    /// key directory there is nothing meaningful to report.
    pub async fn decode(&self, raw: &str) -> Result<DecodedCertificate, ValidationError> {
        self.run_pipeline(raw).await
    }

    /// Strict verification against the current instant.
    pub async fn verify(&self, raw: &str) -> Result<VerifiedCertificate, ValidationError> {
        self.verify_at(raw, Utc::now()).await
    }

    /// Strict verification against a caller-supplied instant.
    pub async fn verify_at(
        &self,
        raw: &str,
        clock: DateTime<Utc>,
    ) -> Result<VerifiedCertificate, ValidationError> {
        let decoded = self.run_pipeline(raw).await?;

        if let Some(error) = decoded.signature_error {
            return Err(error);
        }

        match decoded.expires_at {
            Some(expires_at) if expires_at <= clock => {
                return Err(ValidationError::Expired {
                    expired_at: expires_at,
                })
            }
            Some(_) => {}
            None => warn!("certificate carries no expiration claim, treating as not expired"),
        }

        Ok(VerifiedCertificate {
            certificate: decoded.certificate,
            issuer: decoded.issuer,
            issued_at: decoded.issued_at,
            expires_at: decoded.expires_at,
        })
    }

    /// Full validation against the current instant.
    pub async fn validate(&self, raw: &str) -> Result<ValidationReport, ValidationError> {
        self.validate_at(raw, Utc::now()).await
    }

    /// Full validation: strict verification plus revocation and rule
    /// outcomes.
    pub async fn validate_at(
        &self,
        raw: &str,
        clock: DateTime<Utc>,
    ) -> Result<ValidationReport, ValidationError> {
        let verified = self.verify_at(raw, clock).await?;

        let revoked = match &self.revocations {
            None => None,
            Some(registry) => {
                // Bring the set up to date per cache policy; a failed
                // refresh still leaves the last synchronized set usable.
                if let Err(err) = registry.update().await {
                    warn!(error = %err, "revocation refresh failed, checking against last synchronized set");
                }
                let mut revoked = false;
                for identifier in verified.certificate.identifiers() {
                    if registry.is_revoked(identifier).await? {
                        revoked = true;
                        break;
                    }
                }
                Some(revoked)
            }
        };

        let rules = self.evaluate_rules(&verified).await?;

        Ok(ValidationReport {
            certificate: verified.certificate,
            issuer: verified.issuer,
            issued_at: verified.issued_at,
            expires_at: verified.expires_at,
            revoked,
            rules,
        })
    }

    async fn evaluate_rules(
        &self,
        verified: &VerifiedCertificate,
    ) -> Result<RuleOutcome, ValidationError> {
        let (Some(registry), Some(evaluator)) = (&self.rules, &self.rule_evaluator) else {
            return Ok(RuleOutcome::NotEvaluated);
        };

        let Some(country) = verified
            .issuer
            .as_deref()
            .or_else(|| entry_country(&verified.certificate))
        else {
            warn!("certificate names no country, skipping rule evaluation");
            return Ok(RuleOutcome::NotEvaluated);
        };

        let settings = registry.rules_for(country).await?;
        Ok(evaluator.evaluate(&verified.certificate, &settings).await)
    }

    /// Decode → LocateKey → VerifySignature, with signature failures
    /// captured rather than propagated.
    async fn run_pipeline(&self, raw: &str) -> Result<DecodedCertificate, ValidationError> {
        let envelope = hcert_common::decode(raw)?;
        let claims = ClaimsSet::from_envelope(&envelope)?;
        let certificate = Certificate::from_cbor(&claims.hcert_payload)?;

        let signature_error = self
            .check_signature(&envelope, claims.issuer.as_deref())
            .await?;

        Ok(DecodedCertificate {
            certificate,
            issuer: claims.issuer,
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
            signature_valid: signature_error.is_none(),
            signature_error,
        })
    }

    /// Locate the signing key and verify.
    ///
    /// Returns `Ok(Some(_))` for the captureable failures (no kid, unknown
    /// signer, unsupported algorithm, bad signature); format and
    /// trust-material errors propagate.
    async fn check_signature(
        &self,
        envelope: &SignedEnvelope,
        issuer: Option<&str>,
    ) -> Result<Option<ValidationError>, ValidationError> {
        let Some(kid) = envelope.key_id() else {
            return Ok(Some(ValidationError::SignerNotFound {
                kid: "<absent>".into(),
            }));
        };

        let key = match self.keys.resolve(kid, issuer).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                return Ok(Some(ValidationError::SignerNotFound {
                    kid: BASE64.encode(kid),
                }))
            }
            Err(err) => return Err(err.into()),
        };

        debug!(kid = %key.kid_b64(), country = %key.country, "resolved signing key");

        match verifier::verify(envelope, &key) {
            Ok(()) => Ok(None),
            Err(err @ ValidationError::Format(_)) => Err(err),
            Err(captureable) => Ok(Some(captureable)),
        }
    }
}

fn entry_country(certificate: &Certificate) -> Option<&str> {
    use hcert_common::CertificateEntry::*;
    match &certificate.entry {
        Vaccination(v) => v.first().map(|e| e.country.as_str()),
        Test(t) => t.first().map(|e| e.country.as_str()),
        Recovery(r) => r.first().map(|e| e.country.as_str()),
        Exemption(e) => e.first().map(|x| x.country.as_str()),
    }
}
