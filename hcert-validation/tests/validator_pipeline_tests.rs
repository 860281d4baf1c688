// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end pipeline tests: lenient decode, strict verification, and the
//! full validate flow with revocation and rules wired in.

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use common::{signed_wire, trusted_key_p256, FixedGateway, TEST_KID, TEST_UVCI};
use hcert_trust::{
    ChunkBody, KeyStore, MemoryRevocationStore, RevocationChunk, RevocationDescriptor,
    RevocationOptions, RevocationRegistry, RevocationStore, RuleSetting, RulesRegistry,
    TrustCacheOptions, TrustGateway,
};
use hcert_validation::{
    AcceptAllRules, CertificateValidator, RuleOutcome, ValidationError,
};
use p256::elliptic_curve::rand_core::OsRng;

const ISSUED_AT: i64 = 1_624_000_000;
const EXPIRES_AT: i64 = 1_656_000_000;

fn validator_for(gateway: Arc<FixedGateway>) -> CertificateValidator {
    let keys = Arc::new(KeyStore::new(
        gateway as Arc<dyn TrustGateway>,
        None,
        TrustCacheOptions::default(),
    ));
    CertificateValidator::new(keys)
}

fn before_expiry() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(EXPIRES_AT - 1_000, 0).unwrap()
}

fn after_expiry() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(EXPIRES_AT + 1_000, 0).unwrap()
}

#[tokio::test]
async fn lenient_decode_reports_a_valid_signature() {
    let sk = p256::ecdsa::SigningKey::random(&mut OsRng);
    let gateway = Arc::new(FixedGateway::with_keys(vec![trusted_key_p256(
        TEST_KID,
        "IT",
        sk.verifying_key(),
    )]));
    let validator = validator_for(gateway);

    let decoded = validator
        .decode(&signed_wire(&sk, "IT", ISSUED_AT, EXPIRES_AT, TEST_UVCI))
        .await
        .expect("decode");

    assert!(decoded.signature_valid);
    assert!(decoded.signature_error.is_none());
    assert_eq!(decoded.issuer.as_deref(), Some("IT"));
    assert_eq!(decoded.issued_at.unwrap().timestamp(), ISSUED_AT);
    assert_eq!(decoded.expires_at.unwrap().timestamp(), EXPIRES_AT);
    assert_eq!(decoded.certificate.identifiers(), vec![TEST_UVCI]);
}

#[tokio::test]
async fn strict_verify_returns_the_certificate() {
    let sk = p256::ecdsa::SigningKey::random(&mut OsRng);
    let gateway = Arc::new(FixedGateway::with_keys(vec![trusted_key_p256(
        TEST_KID,
        "IT",
        sk.verifying_key(),
    )]));
    let validator = validator_for(gateway);

    let verified = validator
        .verify_at(
            &signed_wire(&sk, "IT", ISSUED_AT, EXPIRES_AT, TEST_UVCI),
            before_expiry(),
        )
        .await
        .expect("verify");

    assert_eq!(verified.issuer.as_deref(), Some("IT"));
    assert_eq!(verified.certificate.person.surname.as_deref(), Some("Rossi"));
}

#[tokio::test]
async fn expired_certificate_fails_strict_but_decodes_leniently() {
    let sk = p256::ecdsa::SigningKey::random(&mut OsRng);
    let gateway = Arc::new(FixedGateway::with_keys(vec![trusted_key_p256(
        TEST_KID,
        "IT",
        sk.verifying_key(),
    )]));
    let validator = validator_for(gateway);
    let wire = signed_wire(&sk, "IT", ISSUED_AT, EXPIRES_AT, TEST_UVCI);

    let err = validator.verify_at(&wire, after_expiry()).await.unwrap_err();
    assert!(
        matches!(err, ValidationError::Expired { expired_at } if expired_at.timestamp() == EXPIRES_AT),
        "{err:?}"
    );

    // The lenient path still reports a valid signature; expiration is the
    // caller's to check.
    let decoded = validator.decode(&wire).await.expect("decode");
    assert!(decoded.signature_valid);
    assert!(decoded.is_expired_at(after_expiry()));
    assert!(!decoded.is_expired_at(before_expiry()));
}

#[tokio::test]
async fn unknown_signer_is_captured_leniently_and_thrown_strictly() {
    let signer = p256::ecdsa::SigningKey::random(&mut OsRng);
    let directory_key = p256::ecdsa::SigningKey::random(&mut OsRng);
    // The directory only knows a different kid.
    let gateway = Arc::new(FixedGateway::with_keys(vec![trusted_key_p256(
        b"other-kid",
        "IT",
        directory_key.verifying_key(),
    )]));
    let validator = validator_for(gateway);
    let wire = signed_wire(&signer, "IT", ISSUED_AT, EXPIRES_AT, TEST_UVCI);

    let decoded = validator.decode(&wire).await.expect("decode");
    assert!(!decoded.signature_valid);
    assert!(
        matches!(decoded.signature_error, Some(ValidationError::SignerNotFound { .. })),
        "{:?}",
        decoded.signature_error
    );

    let err = validator.verify_at(&wire, before_expiry()).await.unwrap_err();
    assert!(matches!(err, ValidationError::SignerNotFound { .. }), "{err:?}");
}

#[tokio::test]
async fn forged_signature_is_captured_leniently_and_thrown_strictly() {
    let signer = p256::ecdsa::SigningKey::random(&mut OsRng);
    let trusted = p256::ecdsa::SigningKey::random(&mut OsRng);
    // Same kid, different key: the signature cannot verify.
    let gateway = Arc::new(FixedGateway::with_keys(vec![trusted_key_p256(
        TEST_KID,
        "IT",
        trusted.verifying_key(),
    )]));
    let validator = validator_for(gateway);
    let wire = signed_wire(&signer, "IT", ISSUED_AT, EXPIRES_AT, TEST_UVCI);

    let decoded = validator.decode(&wire).await.expect("decode");
    assert!(!decoded.signature_valid);
    assert_eq!(decoded.signature_error, Some(ValidationError::SignatureInvalid));

    let err = validator.verify_at(&wire, before_expiry()).await.unwrap_err();
    assert_eq!(err, ValidationError::SignatureInvalid);
}

#[tokio::test]
async fn malformed_wire_text_always_propagates() {
    let gateway = Arc::new(FixedGateway::with_keys(Vec::new()));
    let validator = validator_for(gateway);

    let err = validator.decode("HC1:%%%").await.unwrap_err();
    assert!(matches!(err, ValidationError::Format(_)), "{err:?}");
}

#[tokio::test]
async fn validate_reports_revocation_and_rules() {
    let sk = p256::ecdsa::SigningKey::random(&mut OsRng);
    let gateway = Arc::new(FixedGateway::with_keys(vec![trusted_key_p256(
        TEST_KID,
        "IT",
        sk.verifying_key(),
    )]));

    // The authority revokes the test certificate's identifier.
    *gateway.descriptor.lock().unwrap() = Some(RevocationDescriptor {
        id: "v1".into(),
        version: 1,
        total_chunks: 1,
        total_entry_count: 1,
    });
    gateway.chunks.lock().unwrap().insert(
        (1, 1),
        RevocationChunk {
            target_id: "v1".into(),
            version: 1,
            chunk_number: 1,
            total_chunks: 1,
            total_entry_count: 1,
            body: ChunkBody::Delta {
                insertions: vec![TEST_UVCI.to_string()],
                deletions: Vec::new(),
            },
        },
    );
    gateway.rules.lock().unwrap().insert(
        "IT".into(),
        vec![RuleSetting {
            name: "vaccine_end_day_complete".into(),
            setting_type: "GENERIC".into(),
            value: "365".into(),
        }],
    );

    let keys = Arc::new(KeyStore::new(
        Arc::clone(&gateway) as Arc<dyn TrustGateway>,
        None,
        TrustCacheOptions::default(),
    ));
    let revocations = Arc::new(RevocationRegistry::new(
        Arc::clone(&gateway) as Arc<dyn TrustGateway>,
        Arc::new(MemoryRevocationStore::new()) as Arc<dyn RevocationStore>,
        TrustCacheOptions::default(),
        RevocationOptions::default(),
    ));
    let rules = Arc::new(RulesRegistry::new(
        Arc::clone(&gateway) as Arc<dyn TrustGateway>,
        None,
        TrustCacheOptions::default(),
    ));

    let validator = CertificateValidator::new(keys)
        .with_revocations(revocations)
        .with_rules(rules, Arc::new(AcceptAllRules));

    let report = validator
        .validate_at(
            &signed_wire(&sk, "IT", ISSUED_AT, EXPIRES_AT, TEST_UVCI),
            before_expiry(),
        )
        .await
        .expect("validate");

    assert_eq!(report.revoked, Some(true));
    assert_eq!(report.rules, RuleOutcome::Passed);

    // A different certificate id is not revoked.
    let report = validator
        .validate_at(
            &signed_wire(&sk, "IT", ISSUED_AT, EXPIRES_AT, "URN:UVCI:01:IT:OTHER#B"),
            before_expiry(),
        )
        .await
        .expect("validate");
    assert_eq!(report.revoked, Some(false));
}

#[tokio::test]
async fn validate_without_registries_reports_no_outcomes() {
    let sk = p256::ecdsa::SigningKey::random(&mut OsRng);
    let gateway = Arc::new(FixedGateway::with_keys(vec![trusted_key_p256(
        TEST_KID,
        "IT",
        sk.verifying_key(),
    )]));
    let validator = validator_for(gateway);

    let report = validator
        .validate_at(
            &signed_wire(&sk, "IT", ISSUED_AT, EXPIRES_AT, TEST_UVCI),
            before_expiry(),
        )
        .await
        .expect("validate");

    assert_eq!(report.revoked, None);
    assert_eq!(report.rules, RuleOutcome::NotEvaluated);
}
