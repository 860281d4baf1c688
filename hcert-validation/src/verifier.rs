// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Algorithm-specific signature verification against a trusted key.
//!
//! Key material is taken from the directory entry's explicit parameters
//! (EC curve point, RSA modulus/exponent) when present, falling back to the
//! SubjectPublicKeyInfo of the entry's raw DER certificate.

use hcert_common::envelope::SignedEnvelope;
use hcert_trust::{EcParameters, KeyFamily, TrustedKey};
use p256::elliptic_curve::sec1::ToEncodedPoint as _;
use p256::pkcs8::DecodePublicKey as _;
use rsa::pss;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};
use signature::Verifier as _;

use crate::algorithms::{resolve_algorithm, CoseAlgorithm};
use crate::der::raw_signature_to_der;
use crate::error::ValidationError;

/// Verify the envelope's signature with `key`.
///
/// The algorithm is resolved from the envelope headers against the
/// registered table; the signature is checked over the envelope's canonical
/// Sig_structure bytes.
pub fn verify(envelope: &SignedEnvelope, key: &TrustedKey) -> Result<(), ValidationError> {
    let alg = resolve_algorithm(envelope)?;
    let message = envelope.signed_bytes()?;
    let signature = envelope.signature.as_slice();

    match alg {
        CoseAlgorithm::ES256 => verify_es256(key, &message, signature),
        CoseAlgorithm::ES384 => verify_es384(key, &message, signature),
        CoseAlgorithm::ES512 => verify_es512(key, &message, signature),
        CoseAlgorithm::PS256 => {
            let vk = pss::VerifyingKey::<Sha256>::new(rsa_public_key(key)?);
            let sig = pss::Signature::try_from(signature)
                .map_err(|_| ValidationError::SignatureInvalid)?;
            vk.verify(&message, &sig)
                .map_err(|_| ValidationError::SignatureInvalid)
        }
        CoseAlgorithm::PS384 => {
            let vk = pss::VerifyingKey::<Sha384>::new(rsa_public_key(key)?);
            let sig = pss::Signature::try_from(signature)
                .map_err(|_| ValidationError::SignatureInvalid)?;
            vk.verify(&message, &sig)
                .map_err(|_| ValidationError::SignatureInvalid)
        }
        CoseAlgorithm::PS512 => {
            let vk = pss::VerifyingKey::<Sha512>::new(rsa_public_key(key)?);
            let sig = pss::Signature::try_from(signature)
                .map_err(|_| ValidationError::SignatureInvalid)?;
            vk.verify(&message, &sig)
                .map_err(|_| ValidationError::SignatureInvalid)
        }
    }
}

/// Verify ES256 (P-256 ECDSA, SHA-256).
fn verify_es256(key: &TrustedKey, msg: &[u8], raw_sig: &[u8]) -> Result<(), ValidationError> {
    let vk = match (&key.ec, &key.certificate) {
        (Some(params), _) => {
            ensure_curve(params, "P-256")?;
            let sec1 = sec1_point(params, 32)?;
            p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map_err(|e| invalid_key(format!("bad P-256 key parameters: {e}")))?
        }
        (None, Some(cert)) => {
            let spki = spki_from_certificate(cert);
            let pk = p256::PublicKey::from_public_key_der(&spki)
                .map_err(|e| invalid_key(format!("bad P-256 public key: {e}")))?;
            let point = pk.to_encoded_point(false);
            p256::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes())
                .map_err(|e| invalid_key(format!("bad P-256 public key: {e}")))?
        }
        (None, None) => return Err(missing_material(KeyFamily::Ec)),
    };

    let der = raw_signature_to_der(raw_sig).map_err(|_| ValidationError::SignatureInvalid)?;
    let sig = p256::ecdsa::Signature::from_der(&der).map_err(|_| ValidationError::SignatureInvalid)?;
    vk.verify(msg, &sig)
        .map_err(|_| ValidationError::SignatureInvalid)
}

/// Verify ES384 (P-384 ECDSA, SHA-384).
fn verify_es384(key: &TrustedKey, msg: &[u8], raw_sig: &[u8]) -> Result<(), ValidationError> {
    let vk = match (&key.ec, &key.certificate) {
        (Some(params), _) => {
            ensure_curve(params, "P-384")?;
            let sec1 = sec1_point(params, 48)?;
            p384::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map_err(|e| invalid_key(format!("bad P-384 key parameters: {e}")))?
        }
        (None, Some(cert)) => {
            let spki = spki_from_certificate(cert);
            let pk = p384::PublicKey::from_public_key_der(&spki)
                .map_err(|e| invalid_key(format!("bad P-384 public key: {e}")))?;
            let point = pk.to_encoded_point(false);
            p384::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes())
                .map_err(|e| invalid_key(format!("bad P-384 public key: {e}")))?
        }
        (None, None) => return Err(missing_material(KeyFamily::Ec)),
    };

    let der = raw_signature_to_der(raw_sig).map_err(|_| ValidationError::SignatureInvalid)?;
    let sig = p384::ecdsa::Signature::from_der(&der).map_err(|_| ValidationError::SignatureInvalid)?;
    vk.verify(msg, &sig)
        .map_err(|_| ValidationError::SignatureInvalid)
}

/// Verify ES512 (P-521 ECDSA, SHA-512).
fn verify_es512(key: &TrustedKey, msg: &[u8], raw_sig: &[u8]) -> Result<(), ValidationError> {
    let vk = match (&key.ec, &key.certificate) {
        (Some(params), _) => {
            ensure_curve(params, "P-521")?;
            let sec1 = sec1_point(params, 66)?;
            p521::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map_err(|e| invalid_key(format!("bad P-521 key parameters: {e}")))?
        }
        (None, Some(cert)) => {
            let spki = spki_from_certificate(cert);
            let pk = p521::PublicKey::from_public_key_der(&spki)
                .map_err(|e| invalid_key(format!("bad P-521 public key: {e}")))?;
            let point = pk.to_encoded_point(false);
            p521::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes())
                .map_err(|e| invalid_key(format!("bad P-521 public key: {e}")))?
        }
        (None, None) => return Err(missing_material(KeyFamily::Ec)),
    };

    let der = raw_signature_to_der(raw_sig).map_err(|_| ValidationError::SignatureInvalid)?;
    let sig = p521::ecdsa::Signature::from_der(&der).map_err(|_| ValidationError::SignatureInvalid)?;
    vk.verify(msg, &sig)
        .map_err(|_| ValidationError::SignatureInvalid)
}

/// Decode an RSA public key from directory parameters or the raw certificate.
fn rsa_public_key(key: &TrustedKey) -> Result<RsaPublicKey, ValidationError> {
    if let Some(params) = &key.rsa {
        return RsaPublicKey::new(
            BigUint::from_bytes_be(&params.modulus),
            BigUint::from_bytes_be(&params.exponent),
        )
        .map_err(|e| invalid_key(format!("bad RSA key parameters: {e}")));
    }

    if let Some(cert) = &key.certificate {
        let spki = spki_from_certificate(cert);
        return RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| invalid_key(format!("bad RSA public key: {e}")));
    }

    Err(missing_material(KeyFamily::Rsa))
}

/// Extract SPKI DER from a DER certificate, passing through inputs that are
/// already SPKI.
fn spki_from_certificate(der: &[u8]) -> Vec<u8> {
    match x509_parser::parse_x509_certificate(der) {
        Ok((_, cert)) => cert.tbs_certificate.subject_pki.raw.to_vec(),
        Err(_) => der.to_vec(),
    }
}

fn ensure_curve(params: &EcParameters, expected: &str) -> Result<(), ValidationError> {
    if params.curve.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(invalid_key(format!(
            "key curve {} does not match required {expected}",
            params.curve
        )))
    }
}

/// Build the uncompressed SEC1 point `04 || x || y` with coordinates
/// left-padded to the field size.
fn sec1_point(params: &EcParameters, coordinate_len: usize) -> Result<Vec<u8>, ValidationError> {
    let mut out = Vec::with_capacity(1 + coordinate_len * 2);
    out.push(0x04);
    push_coordinate(&mut out, &params.x, coordinate_len)?;
    push_coordinate(&mut out, &params.y, coordinate_len)?;
    Ok(out)
}

fn push_coordinate(out: &mut Vec<u8>, coord: &[u8], len: usize) -> Result<(), ValidationError> {
    let start = coord.iter().position(|&b| b != 0).unwrap_or(coord.len());
    let significant = &coord[start..];
    if significant.len() > len {
        return Err(invalid_key(format!(
            "coordinate of {} bytes does not fit the {len}-byte field",
            significant.len()
        )));
    }
    out.resize(out.len() + len - significant.len(), 0);
    out.extend_from_slice(significant);
    Ok(())
}

fn invalid_key(detail: String) -> ValidationError {
    ValidationError::UnsupportedAlgorithm { detail }
}

fn missing_material(family: KeyFamily) -> ValidationError {
    let family = match family {
        KeyFamily::Ec => "ECDSA",
        KeyFamily::Rsa => "RSA-PSS",
    };
    ValidationError::UnsupportedAlgorithm {
        detail: format!("declared algorithm requires {family} key material"),
    }
}
