// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Optional zlib inflation of the decoded certificate body.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::DecodeError;

/// First byte of a zlib stream (deflate, 32K window).
const ZLIB_MAGIC: u8 = 0x78;

/// Upper bound on the inflated size. Certificate payloads are a few hundred
/// bytes; anything near this limit is not a certificate.
const MAX_INFLATED_LEN: u64 = 10 * 1024 * 1024;

/// Inflate `input` when it starts a zlib stream, otherwise return the bytes
/// unmodified.
pub fn inflate_if_compressed(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    match input.first() {
        Some(&ZLIB_MAGIC) => inflate(input),
        _ => Ok(input.to_vec()),
    }
}

fn inflate(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(input).take(MAX_INFLATED_LEN + 1);

    decoder
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Decompression(e.to_string()))?;

    if out.len() as u64 > MAX_INFLATED_LEN {
        return Err(DecodeError::Decompression(format!(
            "inflated size exceeds {MAX_INFLATED_LEN} bytes"
        )));
    }

    Ok(out)
}
