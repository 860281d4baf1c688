// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// Errors produced while decoding wire text into a structured certificate.
///
/// Every variant is a format error in the sense of the validation pipeline:
/// the input cannot be turned into a well-formed signed envelope or claims
/// set, and no later stage can recover from it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The input does not start with the recognized certificate prefix.
    #[error("missing certificate prefix '{expected}'")]
    MissingPrefix {
        /// The prefix that was expected.
        expected: &'static str,
    },

    /// The base45 portion contains a character outside the alphabet, or has
    /// an impossible length or value.
    #[error("invalid base45 encoding: {0}")]
    Base45(String),

    /// The zlib stream could not be inflated, or inflated past the size cap.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// The CBOR/COSE structure is malformed (wrong arity, wrong element
    /// types, unexpected tag, trailing bytes).
    #[error("malformed COSE structure: {0}")]
    Cose(String),

    /// The CWT claims payload is missing or malformed.
    #[error("malformed claims payload: {0}")]
    Claims(String),

    /// The embedded certificate payload does not match the expected schema.
    #[error("malformed certificate payload: {0}")]
    Certificate(String),
}
