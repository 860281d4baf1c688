// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Re-packaging of raw `r || s` ECDSA signatures as ASN.1 DER.
//!
//! COSE carries ECDSA signatures as the fixed-width concatenation of the two
//! scalars. The DER form wraps both as big-endian unsigned INTEGERs inside a
//! SEQUENCE: leading zero bytes are stripped, a `0x00` pad is re-added when
//! the top bit is set, and the SEQUENCE length uses the short form up to 127
//! bytes and the long form beyond.

use thiserror::Error;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DerError {
    #[error("raw signature length {0} is not an even split")]
    OddLength(usize),

    #[error("empty signature")]
    Empty,

    #[error("malformed DER signature: {0}")]
    Malformed(String),

    #[error("integer does not fit {0}-byte coordinates")]
    CoordinateOverflow(usize),
}

/// Convert a raw `r || s` signature into a DER SEQUENCE of two INTEGERs.
pub fn raw_signature_to_der(raw: &[u8]) -> Result<Vec<u8>, DerError> {
    if raw.is_empty() {
        return Err(DerError::Empty);
    }
    if raw.len() % 2 != 0 {
        return Err(DerError::OddLength(raw.len()));
    }

    let (r, s) = raw.split_at(raw.len() / 2);
    let r = encode_integer(r);
    let s = encode_integer(s);

    let body_len = r.len() + s.len();
    let mut out = Vec::with_capacity(body_len + 4);
    out.push(TAG_SEQUENCE);
    push_length(&mut out, body_len);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    Ok(out)
}

/// Recover the raw `r || s` form from a DER signature, left-padding each
/// scalar to `coordinate_len` bytes.
pub fn der_signature_to_raw(der: &[u8], coordinate_len: usize) -> Result<Vec<u8>, DerError> {
    let mut cursor = Cursor { der, pos: 0 };

    let (tag, body_len) = cursor.header()?;
    if tag != TAG_SEQUENCE {
        return Err(DerError::Malformed(format!("expected SEQUENCE, found tag {tag:#04x}")));
    }
    if cursor.remaining() != body_len {
        return Err(DerError::Malformed("SEQUENCE length mismatch".into()));
    }

    let mut out = Vec::with_capacity(coordinate_len * 2);
    for _ in 0..2 {
        let (tag, len) = cursor.header()?;
        if tag != TAG_INTEGER {
            return Err(DerError::Malformed(format!("expected INTEGER, found tag {tag:#04x}")));
        }
        let bytes = cursor.take(len)?;
        // Drop the sign pad and any redundant leading zeros.
        let significant = strip_leading_zeros(bytes);
        if significant.len() > coordinate_len {
            return Err(DerError::CoordinateOverflow(coordinate_len));
        }
        out.resize(out.len() + coordinate_len - significant.len(), 0);
        out.extend_from_slice(significant);
    }

    if cursor.remaining() != 0 {
        return Err(DerError::Malformed("trailing bytes after SEQUENCE".into()));
    }

    Ok(out)
}

/// Encode one scalar as a DER INTEGER with tag and length.
fn encode_integer(bytes: &[u8]) -> Vec<u8> {
    let significant = strip_leading_zeros(bytes);

    // A set top bit would read as negative; pad with 0x00.
    let pad = significant.first().is_some_and(|b| b & 0x80 != 0);
    let content_len = significant.len() + usize::from(pad);

    let mut out = Vec::with_capacity(content_len + 3);
    out.push(TAG_INTEGER);
    push_length(&mut out, content_len);
    if pad {
        out.push(0x00);
    }
    out.extend_from_slice(significant);
    out
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b != 0) {
        Some(start) => &bytes[start..],
        // All zero (or empty): keep a single zero byte when there is one.
        None => &bytes[bytes.len().saturating_sub(1)..],
    }
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len <= 0x7F {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
        let significant = &bytes[start..];
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(significant);
    }
}

struct Cursor<'a> {
    der: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn header(&mut self) -> Result<(u8, usize), DerError> {
        let tag = *self
            .der
            .get(self.pos)
            .ok_or_else(|| DerError::Malformed("truncated header".into()))?;
        let first = *self
            .der
            .get(self.pos + 1)
            .ok_or_else(|| DerError::Malformed("truncated length".into()))?;
        self.pos += 2;

        let len = if first & 0x80 == 0 {
            usize::from(first)
        } else {
            let count = usize::from(first & 0x7F);
            if count == 0 || count > std::mem::size_of::<usize>() {
                return Err(DerError::Malformed("unsupported length encoding".into()));
            }
            let mut len = 0usize;
            for _ in 0..count {
                let byte = *self
                    .der
                    .get(self.pos)
                    .ok_or_else(|| DerError::Malformed("truncated length".into()))?;
                self.pos += 1;
                len = (len << 8) | usize::from(byte);
            }
            len
        };

        Ok((tag, len))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DerError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.der.len())
            .ok_or_else(|| DerError::Malformed("truncated content".into()))?;
        let bytes = &self.der[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn remaining(&self) -> usize {
        self.der.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(raw: &[u8]) {
        let coordinate_len = raw.len() / 2;
        let der = raw_signature_to_der(raw).expect("to der");
        let back = der_signature_to_raw(&der, coordinate_len).expect("from der");
        assert_eq!(back, raw, "raw {raw:02x?} der {der:02x?}");
    }

    #[test]
    fn round_trips_plain_coordinates() {
        round_trip(&[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn round_trips_high_bit_coordinates() {
        // Both scalars need a 0x00 sign pad in DER.
        round_trip(&[0xFF; 64]);
    }

    #[test]
    fn round_trips_leading_zero_coordinates() {
        let mut raw = vec![0u8; 64];
        raw[31] = 0x7F; // r = 0x7F
        raw[32] = 0x80; // s has the top bit set after stripping
        raw[63] = 0x01;
        round_trip(&raw);
    }

    #[test]
    fn round_trips_zero_scalar() {
        round_trip(&[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn round_trips_p521_width_with_long_form_length() {
        // 66-byte coordinates push the SEQUENCE body past 127 bytes, which
        // exercises the long-form length encoding.
        let raw = vec![0x91u8; 132];
        let der = raw_signature_to_der(&raw).expect("to der");
        assert_eq!(der[1], 0x81, "expected long-form length, got {:#04x}", der[1]);
        assert_eq!(der_signature_to_raw(&der, 66).expect("from der"), raw);
    }

    #[test]
    fn rejects_odd_length_input() {
        assert_eq!(
            raw_signature_to_der(&[1, 2, 3]),
            Err(DerError::OddLength(3))
        );
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(raw_signature_to_der(&[]), Err(DerError::Empty));
    }

    #[test]
    fn rejects_truncated_der() {
        let der = raw_signature_to_der(&[0x01, 0x02, 0x03, 0x04]).unwrap();
        assert!(der_signature_to_raw(&der[..der.len() - 1], 2).is_err());
    }

    #[test]
    fn rejects_oversized_integer_for_coordinate_width() {
        let der = raw_signature_to_der(&[0x11; 64]).unwrap();
        assert_eq!(
            der_signature_to_raw(&der, 16),
            Err(DerError::CoordinateOverflow(16))
        );
    }
}
