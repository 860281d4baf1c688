// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! CBOR header maps and the generic value tree shared by header and claims
//! decoding.

use std::collections::BTreeMap;

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};

use crate::error::DecodeError;

/// COSE header label for the signature algorithm.
pub const HEADER_ALG: i64 = 1;
/// COSE header label for the key identifier.
pub const HEADER_KID: i64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MapKey {
    Int(i64),
    Text(String),
}

/// A decoded CBOR value. Covers the subset of CBOR that appears in COSE
/// headers and CWT claim payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum CborValue {
    Int(i64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<CborValue>),
    Map(BTreeMap<MapKey, CborValue>),
    Bool(bool),
    Null,
}

impl CborValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CborValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CborValue::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CborValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<MapKey, CborValue>> {
        match self {
            CborValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CborValue]> {
        match self {
            CborValue::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }
}

/// A COSE header map together with the exact bytes it was decoded from.
///
/// The encoded form of the protected header map is signature-relevant: the
/// Sig_structure embeds the original bytes, never a re-encoding.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CoseHeaderMap {
    encoded: Vec<u8>,
    map: BTreeMap<MapKey, CborValue>,
}

impl CoseHeaderMap {
    pub(crate) fn new(encoded: Vec<u8>, map: BTreeMap<MapKey, CborValue>) -> Self {
        Self { encoded, map }
    }

    /// The original encoded bytes of this map. Empty for unprotected headers.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn get(&self, label: i64) -> Option<&CborValue> {
        self.map.get(&MapKey::Int(label))
    }

    pub fn get_i64(&self, label: i64) -> Option<i64> {
        self.get(label).and_then(CborValue::as_i64)
    }

    pub fn get_bytes(&self, label: i64) -> Option<&[u8]> {
        self.get(label).and_then(CborValue::as_bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The map contents as a [`CborValue`], for re-encoding.
    pub fn to_value(&self) -> CborValue {
        CborValue::Map(self.map.clone())
    }
}

/// Decode a protected header map from its encoded byte string.
///
/// An empty byte string is a valid empty map.
pub(crate) fn decode_header_map(bytes: &[u8]) -> Result<CoseHeaderMap, DecodeError> {
    if bytes.is_empty() {
        return Ok(CoseHeaderMap::new(Vec::new(), BTreeMap::new()));
    }

    let mut dec = Decoder::new(bytes);
    let map = decode_map(&mut dec)?;

    if dec.position() != bytes.len() {
        return Err(DecodeError::Cose("trailing bytes after header map".into()));
    }

    Ok(CoseHeaderMap::new(bytes.to_vec(), map))
}

/// Decode a header map in place from an outer decoder (unprotected headers).
pub(crate) fn decode_header_map_inline(dec: &mut Decoder<'_>) -> Result<CoseHeaderMap, DecodeError> {
    Ok(CoseHeaderMap::new(Vec::new(), decode_map(dec)?))
}

fn decode_map(dec: &mut Decoder<'_>) -> Result<BTreeMap<MapKey, CborValue>, DecodeError> {
    let len = dec
        .map()
        .map_err(|e| DecodeError::Cose(format!("failed to read map: {e}")))?
        .ok_or_else(|| DecodeError::Cose("indefinite-length maps are not supported".into()))?;

    let mut map = BTreeMap::new();
    for _ in 0..len {
        let key = decode_key(dec)?;
        let value = decode_value(dec)?;
        map.insert(key, value);
    }
    Ok(map)
}

fn decode_key(dec: &mut Decoder<'_>) -> Result<MapKey, DecodeError> {
    match datatype(dec)? {
        Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::Int | Type::U8 | Type::U16
        | Type::U32 | Type::U64 => {
            let i = dec
                .i64()
                .map_err(|e| DecodeError::Cose(format!("failed to decode int key: {e}")))?;
            Ok(MapKey::Int(i))
        }
        Type::String => {
            let s = dec
                .str()
                .map_err(|e| DecodeError::Cose(format!("failed to decode text key: {e}")))?;
            Ok(MapKey::Text(s.to_string()))
        }
        other => Err(DecodeError::Cose(format!("unsupported map key type: {other:?}"))),
    }
}

/// Decode a single CBOR item into a [`CborValue`].
pub fn decode_value(dec: &mut Decoder<'_>) -> Result<CborValue, DecodeError> {
    match datatype(dec)? {
        Type::Null => {
            dec.null().map_err(cose_err)?;
            Ok(CborValue::Null)
        }
        Type::Bool => Ok(CborValue::Bool(dec.bool().map_err(cose_err)?)),
        Type::Bytes => Ok(CborValue::Bytes(dec.bytes().map_err(cose_err)?.to_vec())),
        Type::String => Ok(CborValue::Text(dec.str().map_err(cose_err)?.to_string())),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::Int | Type::U8 | Type::U16
        | Type::U32 | Type::U64 => Ok(CborValue::Int(dec.i64().map_err(cose_err)?)),
        Type::Array => {
            let len = dec
                .array()
                .map_err(cose_err)?
                .ok_or_else(|| DecodeError::Cose("indefinite-length arrays are not supported".into()))?;
            let mut out = Vec::with_capacity(len as usize);
            for _ in 0..len {
                out.push(decode_value(dec)?);
            }
            Ok(CborValue::Array(out))
        }
        Type::Map => Ok(CborValue::Map(decode_map(dec)?)),
        other => Err(DecodeError::Cose(format!("unsupported value type: {other:?}"))),
    }
}

/// Encode a [`CborValue`] onto an encoder.
///
/// Used to re-encode the embedded certificate payload as standalone bytes.
pub fn encode_value<W: minicbor::encode::Write>(
    value: &CborValue,
    enc: &mut Encoder<W>,
) -> Result<(), DecodeError>
where
    W::Error: std::fmt::Display,
{
    match value {
        CborValue::Int(i) => enc.i64(*i).map(|_| ()).map_err(enc_err)?,
        CborValue::Bytes(b) => enc.bytes(b).map(|_| ()).map_err(enc_err)?,
        CborValue::Text(s) => enc.str(s).map(|_| ()).map_err(enc_err)?,
        CborValue::Bool(b) => enc.bool(*b).map(|_| ()).map_err(enc_err)?,
        CborValue::Null => enc.null().map(|_| ()).map_err(enc_err)?,
        CborValue::Array(items) => {
            enc.array(items.len() as u64).map(|_| ()).map_err(enc_err)?;
            for item in items {
                encode_value(item, enc)?;
            }
        }
        CborValue::Map(map) => {
            enc.map(map.len() as u64).map(|_| ()).map_err(enc_err)?;
            for (key, val) in map {
                match key {
                    MapKey::Int(i) => enc.i64(*i).map(|_| ()).map_err(enc_err)?,
                    MapKey::Text(s) => enc.str(s).map(|_| ()).map_err(enc_err)?,
                }
                encode_value(val, enc)?;
            }
        }
    }
    Ok(())
}

/// Encode a [`CborValue`] into a fresh byte vector.
pub fn encode_value_to_vec(value: &CborValue) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    let mut enc = Encoder::new(&mut out);
    encode_value(value, &mut enc)?;
    Ok(out)
}

fn datatype(dec: &mut Decoder<'_>) -> Result<Type, DecodeError> {
    dec.datatype().map_err(cose_err)
}

fn cose_err(e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Cose(e.to_string())
}

fn enc_err(e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Cose(format!("encode failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_int_and_text_keys() {
        // {1: -7, "kid": h'AABB'}
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(2).unwrap();
        enc.i64(1).unwrap();
        enc.i64(-7).unwrap();
        enc.str("kid").unwrap();
        enc.bytes(&[0xAA, 0xBB]).unwrap();

        let map = decode_header_map(&buf).unwrap();
        assert_eq!(map.get_i64(HEADER_ALG), Some(-7));
        assert_eq!(map.encoded(), buf.as_slice());
    }

    #[test]
    fn empty_bytes_decode_to_empty_map() {
        let map = decode_header_map(&[]).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(0).unwrap();
        buf.push(0x00);
        assert!(decode_header_map(&buf).is_err());
    }

    #[test]
    fn value_round_trip() {
        let mut inner = BTreeMap::new();
        inner.insert(MapKey::Text("ci".into()), CborValue::Text("URN:UVCI:01".into()));
        let value = CborValue::Map(inner);

        let bytes = encode_value_to_vec(&value).unwrap();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(decode_value(&mut dec).unwrap(), value);
    }
}
