// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use chrono::{DateTime, Utc};
use hcert_common::DecodeError;
use hcert_trust::TrustError;
use thiserror::Error;

/// Errors surfaced by the validation pipeline.
///
/// The strict entry points return every variant. The lenient entry point
/// captures [`SignerNotFound`](ValidationError::SignerNotFound),
/// [`SignatureInvalid`](ValidationError::SignatureInvalid),
/// [`UnsupportedAlgorithm`](ValidationError::UnsupportedAlgorithm) and
/// [`Expired`](ValidationError::Expired) in the result object instead;
/// format and trust-material errors always propagate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// The wire text could not be decoded into a well-formed envelope,
    /// claims set or certificate.
    #[error(transparent)]
    Format(#[from] DecodeError),

    /// The declared algorithm is outside the registered table, or the
    /// resolved key lacks the parameter set the algorithm family requires.
    #[error("unsupported algorithm: {detail}")]
    UnsupportedAlgorithm {
        detail: String,
    },

    /// No trusted key matched the envelope's key identifier.
    #[error("no trusted signing key found for kid {kid}")]
    SignerNotFound {
        /// Key identifier in base64 display form, or a placeholder when the
        /// envelope carries none.
        kid: String,
    },

    /// The signature does not verify against the resolved key.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// The claims expiration lies before the validation instant.
    #[error("certificate expired at {expired_at}")]
    Expired {
        expired_at: DateTime<Utc>,
    },

    /// Trust material could not be obtained, or the provider was disposed.
    #[error(transparent)]
    Trust(#[from] TrustError),
}
