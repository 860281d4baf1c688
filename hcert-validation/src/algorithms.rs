// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The registered COSE algorithm table.
//!
//! The table is closed: six signed small-integer identifiers, three ECDSA
//! and three RSA-PSS, each tied to its hash. Anything else is rejected
//! before key material is even looked at.

use hcert_common::envelope::SignedEnvelope;
use hcert_common::header_map::HEADER_ALG;
use hcert_trust::KeyFamily;

use crate::error::ValidationError;

/// A registered COSE signature algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i64)]
pub enum CoseAlgorithm {
    /// ECDSA w/ SHA-256 over P-256.
    ES256 = -7,
    /// ECDSA w/ SHA-384 over P-384.
    ES384 = -35,
    /// ECDSA w/ SHA-512 over P-521.
    ES512 = -36,
    /// RSASSA-PSS w/ SHA-256.
    PS256 = -37,
    /// RSASSA-PSS w/ SHA-384.
    PS384 = -38,
    /// RSASSA-PSS w/ SHA-512.
    PS512 = -39,
}

impl CoseAlgorithm {
    /// Look up a registered algorithm by its COSE label.
    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            -7 => Some(Self::ES256),
            -35 => Some(Self::ES384),
            -36 => Some(Self::ES512),
            -37 => Some(Self::PS256),
            -38 => Some(Self::PS384),
            -39 => Some(Self::PS512),
            _ => None,
        }
    }

    pub fn label(self) -> i64 {
        self as i64
    }

    /// The key family this algorithm verifies with.
    pub fn family(self) -> KeyFamily {
        match self {
            Self::ES256 | Self::ES384 | Self::ES512 => KeyFamily::Ec,
            Self::PS256 | Self::PS384 | Self::PS512 => KeyFamily::Rsa,
        }
    }

    /// Byte length of one ECDSA signature coordinate, `None` for RSA.
    pub fn coordinate_len(self) -> Option<usize> {
        match self {
            Self::ES256 => Some(32),
            Self::ES384 => Some(48),
            Self::ES512 => Some(66),
            Self::PS256 | Self::PS384 | Self::PS512 => None,
        }
    }

    /// The curve name the key directory uses for this algorithm, `None` for
    /// RSA.
    pub fn curve_name(self) -> Option<&'static str> {
        match self {
            Self::ES256 => Some("P-256"),
            Self::ES384 => Some("P-384"),
            Self::ES512 => Some("P-521"),
            Self::PS256 | Self::PS384 | Self::PS512 => None,
        }
    }
}

/// Resolve the envelope's algorithm against the registered table.
///
/// The `alg` header is read from the protected map first, then the
/// unprotected map. A missing or unregistered value is an unsupported
/// algorithm.
pub fn resolve_algorithm(envelope: &SignedEnvelope) -> Result<CoseAlgorithm, ValidationError> {
    let label = envelope
        .protected
        .get_i64(HEADER_ALG)
        .or_else(|| envelope.unprotected.get_i64(HEADER_ALG))
        .ok_or_else(|| ValidationError::UnsupportedAlgorithm {
            detail: "missing alg header".into(),
        })?;

    CoseAlgorithm::from_label(label).ok_or_else(|| ValidationError::UnsupportedAlgorithm {
        detail: format!("unregistered alg {label}"),
    })
}
