// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! CWT claims extraction from a signed envelope payload.

use chrono::{DateTime, Utc};
use minicbor::Decoder;

use crate::envelope::SignedEnvelope;
use crate::error::DecodeError;
use crate::header_map::{decode_value, encode_value_to_vec, CborValue, MapKey};

/// CWT claim key for the issuer (ISO 3166-1 country code).
pub const CLAIM_ISSUER: i64 = 1;
/// CWT claim key for the expiration time.
pub const CLAIM_EXPIRATION: i64 = 4;
/// CWT claim key for the issued-at time.
pub const CLAIM_ISSUED_AT: i64 = 6;
/// CWT claim key for the embedded health certificate container.
pub const CLAIM_HCERT: i64 = -260;
/// Container key of the certificate payload inside the `-260` claim.
pub const HCERT_V1: i64 = 1;

/// Issuer and validity metadata plus the embedded certificate payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimsSet {
    /// Issuing country, when present.
    pub issuer: Option<String>,
    /// Issued-at instant, when present.
    pub issued_at: Option<DateTime<Utc>>,
    /// Expiration instant, when present.
    pub expires_at: Option<DateTime<Utc>>,
    /// Re-encoded CBOR bytes of the embedded certificate payload.
    pub hcert_payload: Vec<u8>,
}

impl ClaimsSet {
    /// Parse the claims out of an envelope payload.
    ///
    /// An absent payload is a format error: claims cannot be extracted from
    /// a detached-payload envelope.
    pub fn from_envelope(envelope: &SignedEnvelope) -> Result<Self, DecodeError> {
        let payload = envelope
            .payload
            .as_deref()
            .ok_or_else(|| DecodeError::Claims("envelope payload is absent".into()))?;

        let mut dec = Decoder::new(payload);
        let value = decode_value(&mut dec)
            .map_err(|e| DecodeError::Claims(format!("payload is not valid CBOR: {e}")))?;
        let map = value
            .as_map()
            .ok_or_else(|| DecodeError::Claims("claims payload is not a map".into()))?;

        let issuer = map
            .get(&MapKey::Int(CLAIM_ISSUER))
            .and_then(CborValue::as_text)
            .map(str::to_owned);
        let issued_at = timestamp(map.get(&MapKey::Int(CLAIM_ISSUED_AT)))?;
        let expires_at = timestamp(map.get(&MapKey::Int(CLAIM_EXPIRATION)))?;

        let hcert = map
            .get(&MapKey::Int(CLAIM_HCERT))
            .ok_or_else(|| DecodeError::Claims("missing health certificate claim".into()))?
            .as_map()
            .ok_or_else(|| DecodeError::Claims("health certificate claim is not a map".into()))?;

        let container = hcert
            .get(&MapKey::Int(HCERT_V1))
            .ok_or_else(|| DecodeError::Claims("missing certificate container entry".into()))?;

        let hcert_payload = encode_value_to_vec(container)?;

        Ok(Self {
            issuer,
            issued_at,
            expires_at,
            hcert_payload,
        })
    }
}

fn timestamp(value: Option<&CborValue>) -> Result<Option<DateTime<Utc>>, DecodeError> {
    match value {
        None => Ok(None),
        Some(v) => {
            let secs = v
                .as_i64()
                .ok_or_else(|| DecodeError::Claims("timestamp claim is not an integer".into()))?;
            DateTime::<Utc>::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| DecodeError::Claims(format!("timestamp {secs} is out of range")))
        }
    }
}
