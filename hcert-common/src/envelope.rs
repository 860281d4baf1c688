// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! COSE_Sign1 envelope parsing and the full wire-decode pipeline.
//!
//! The wire format is `"HC1:" + base45(zlib(COSE_Sign1))`. The COSE layer is
//! an ordered 4-tuple `[protected bstr, unprotected map, payload bstr/null,
//! signature bstr]`, optionally wrapped in up to two CBOR tags which must
//! both carry the COSE_Sign1 tag value.

use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};

use crate::decompress::inflate_if_compressed;
use crate::error::DecodeError;
use crate::header_map::{
    decode_header_map, decode_header_map_inline, CoseHeaderMap, HEADER_KID,
};
use crate::base45;

/// The recognized wire prefix of an HCERT version 1 certificate.
pub const WIRE_PREFIX: &str = "HC1:";

/// CBOR tag value for COSE_Sign1.
pub const COSE_SIGN1_TAG: u64 = 18;

/// Maximum number of tag wrappers accepted around the COSE array.
const MAX_TAG_WRAPPERS: usize = 2;

const SIG_STRUCTURE_CONTEXT: &str = "Signature1";

/// A parsed COSE_Sign1 envelope.
#[derive(Debug, Clone, Default)]
pub struct SignedEnvelope {
    /// Protected header map, plus the exact bytes signatures are bound to.
    pub protected: CoseHeaderMap,
    /// Unprotected header map.
    pub unprotected: CoseHeaderMap,
    /// Embedded payload, `None` when detached.
    pub payload: Option<Vec<u8>>,
    /// Raw signature bytes (`r || s` for ECDSA).
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    /// The key identifier, looked up in the protected header first and the
    /// unprotected header as a fallback.
    pub fn key_id(&self) -> Option<&[u8]> {
        self.protected
            .get_bytes(HEADER_KID)
            .or_else(|| self.unprotected.get_bytes(HEADER_KID))
    }

    /// Encode the Sig_structure this envelope's signature is computed over:
    /// `["Signature1", protected bstr, external_aad h'', payload bstr]`.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        let payload = self
            .payload
            .as_deref()
            .ok_or_else(|| DecodeError::Cose("detached payload has no signed bytes".into()))?;

        let mut out = Vec::with_capacity(128 + self.protected.encoded().len() + payload.len());
        let mut enc = Encoder::new(&mut out);
        enc.array(4).map_err(enc_err)?;
        enc.str(SIG_STRUCTURE_CONTEXT).map_err(enc_err)?;
        enc.bytes(self.protected.encoded()).map_err(enc_err)?;
        enc.bytes(&[]).map_err(enc_err)?;
        enc.bytes(payload).map_err(enc_err)?;
        Ok(out)
    }

    /// Encode this envelope to tagged COSE_Sign1 bytes.
    pub fn to_cose_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        let mut enc = Encoder::new(&mut out);
        enc.tag(Tag::new(COSE_SIGN1_TAG)).map_err(enc_err)?;
        enc.array(4).map_err(enc_err)?;
        enc.bytes(self.protected.encoded()).map_err(enc_err)?;
        // The unprotected map is re-encoded; only protected bytes are
        // signature-relevant.
        crate::header_map::encode_value(&self.unprotected.to_value(), &mut enc)?;
        match &self.payload {
            Some(p) => enc.bytes(p).map(|_| ()).map_err(enc_err)?,
            None => enc.null().map(|_| ()).map_err(enc_err)?,
        }
        enc.bytes(&self.signature).map_err(enc_err)?;
        Ok(out)
    }
}

/// Decode raw wire text into a [`SignedEnvelope`].
///
/// Pipeline: prefix strip, base45 decode, zlib inflate, COSE parse.
pub fn decode(raw: &str) -> Result<SignedEnvelope, DecodeError> {
    let body = raw
        .strip_prefix(WIRE_PREFIX)
        .ok_or(DecodeError::MissingPrefix { expected: WIRE_PREFIX })?;

    let compressed = base45::decode(body.trim_end())?;
    let cose = inflate_if_compressed(&compressed)?;
    parse_cose_sign1(&cose)
}

/// Parse COSE_Sign1 bytes into a [`SignedEnvelope`].
pub fn parse_cose_sign1(input: &[u8]) -> Result<SignedEnvelope, DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::Cose("empty input".into()));
    }

    let mut dec = Decoder::new(input);

    // Strip tag wrappers. Every wrapper must carry the COSE_Sign1 tag, and
    // more than two wrappers is a malformed envelope.
    let mut wrappers = 0usize;
    while matches!(dec.datatype().map_err(cose_err)?, Type::Tag) {
        if wrappers == MAX_TAG_WRAPPERS {
            return Err(DecodeError::Cose("more than 2 tag wrappers".into()));
        }
        let tag = dec
            .tag()
            .map_err(|e| DecodeError::Cose(format!("failed to read CBOR tag: {e}")))?;
        if tag != Tag::new(COSE_SIGN1_TAG) {
            return Err(DecodeError::Cose(format!(
                "unexpected CBOR tag {tag:?} (expected COSE_Sign1 tag {COSE_SIGN1_TAG})"
            )));
        }
        wrappers += 1;
    }

    let len = dec
        .array()
        .map_err(|e| DecodeError::Cose(format!("top-level item is not an array: {e}")))?
        .ok_or_else(|| DecodeError::Cose("indefinite-length arrays are not supported".into()))?;

    if len != 4 {
        return Err(DecodeError::Cose(format!("array length was {len}, not 4")));
    }

    // protected headers (bstr)
    let protected_raw = dec
        .bytes()
        .map_err(|e| DecodeError::Cose(format!("failed to read protected headers (bstr): {e}")))?
        .to_vec();
    let protected = decode_header_map(&protected_raw)?;

    // unprotected headers (map)
    if !matches!(dec.datatype().map_err(cose_err)?, Type::Map) {
        return Err(DecodeError::Cose("unprotected headers are not a map".into()));
    }
    let unprotected = decode_header_map_inline(&mut dec)?;

    // payload (bstr or null)
    let payload = match dec.datatype().map_err(cose_err)? {
        Type::Null => {
            dec.null().map_err(cose_err)?;
            None
        }
        Type::Bytes => Some(dec.bytes().map_err(cose_err)?.to_vec()),
        other => {
            return Err(DecodeError::Cose(format!(
                "payload must be bstr or null, found {other:?}"
            )))
        }
    };

    // signature (bstr)
    let signature = dec
        .bytes()
        .map_err(|e| DecodeError::Cose(format!("failed to read signature (bstr): {e}")))?
        .to_vec();

    if dec.position() != input.len() {
        return Err(DecodeError::Cose("trailing bytes after COSE_Sign1".into()));
    }

    Ok(SignedEnvelope {
        protected,
        unprotected,
        payload,
        signature,
    })
}

fn cose_err(e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Cose(e.to_string())
}

fn enc_err(e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Cose(format!("encode failed: {e}"))
}
