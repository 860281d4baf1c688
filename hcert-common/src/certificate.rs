// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed model of the embedded health certificate payload.
//!
//! The payload is a CBOR map with short text keys following the EU DCC
//! schema: person identity under `nam`/`dob`, and exactly one of the
//! `v`/`t`/`r`/`e` entry groups (vaccination, test, recovery, exemption).

use std::collections::BTreeMap;

use minicbor::Decoder;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::header_map::{decode_value, CborValue, MapKey};

/// Person identity as carried in the certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    /// Surname as printed.
    pub surname: Option<String>,
    /// Surname in ICAO 9303 transliteration.
    pub standardised_surname: Option<String>,
    /// Forename as printed.
    pub forename: Option<String>,
    /// Forename in ICAO 9303 transliteration.
    pub standardised_forename: Option<String>,
}

/// A vaccination record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccinationEntry {
    pub target_disease: String,
    pub vaccine: Option<String>,
    pub product: Option<String>,
    pub manufacturer: Option<String>,
    pub dose_number: u32,
    pub total_doses: u32,
    pub date: String,
    pub country: String,
    pub issuer: String,
    pub id: String,
}

/// A test record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEntry {
    pub target_disease: String,
    pub test_type: String,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub sample_collected_at: String,
    pub result: String,
    pub testing_centre: Option<String>,
    pub country: String,
    pub issuer: String,
    pub id: String,
}

/// A recovery record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryEntry {
    pub target_disease: String,
    pub first_positive_test: String,
    pub valid_from: String,
    pub valid_until: String,
    pub country: String,
    pub issuer: String,
    pub id: String,
}

/// An exemption record (national extension).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExemptionEntry {
    pub target_disease: String,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
    pub country: String,
    pub issuer: String,
    pub id: String,
}

/// The single entry group a certificate carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateEntry {
    Vaccination(Vec<VaccinationEntry>),
    Test(Vec<TestEntry>),
    Recovery(Vec<RecoveryEntry>),
    Exemption(Vec<ExemptionEntry>),
}

/// A decoded health certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Schema version string (`ver`).
    pub version: String,
    pub person: PersonName,
    /// Date of birth, possibly partial (`YYYY` or `YYYY-MM`).
    pub date_of_birth: Option<String>,
    pub entry: CertificateEntry,
}

impl Certificate {
    /// Parse a certificate from its re-encoded CBOR payload bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut dec = Decoder::new(bytes);
        let value = decode_value(&mut dec)
            .map_err(|e| DecodeError::Certificate(format!("payload is not valid CBOR: {e}")))?;
        let map = value
            .as_map()
            .ok_or_else(|| DecodeError::Certificate("certificate payload is not a map".into()))?;

        let version = required_text(map, "ver")?;
        let person = person_name(map)?;
        let date_of_birth = optional_text(map, "dob");

        let vaccinations = entry_group(map, "v", vaccination_entry)?;
        let tests = entry_group(map, "t", test_entry)?;
        let recoveries = entry_group(map, "r", recovery_entry)?;
        let exemptions = entry_group(map, "e", exemption_entry)?;

        let mut groups: Vec<CertificateEntry> = Vec::new();
        if !vaccinations.is_empty() {
            groups.push(CertificateEntry::Vaccination(vaccinations));
        }
        if !tests.is_empty() {
            groups.push(CertificateEntry::Test(tests));
        }
        if !recoveries.is_empty() {
            groups.push(CertificateEntry::Recovery(recoveries));
        }
        if !exemptions.is_empty() {
            groups.push(CertificateEntry::Exemption(exemptions));
        }

        // Exactly one entry group per certificate.
        let entry = match groups.len() {
            1 => groups.remove(0),
            0 => return Err(DecodeError::Certificate("certificate carries no entry group".into())),
            n => {
                return Err(DecodeError::Certificate(format!(
                    "certificate carries {n} entry groups, expected exactly 1"
                )))
            }
        };

        Ok(Self {
            version,
            person,
            date_of_birth,
            entry,
        })
    }

    /// The unique certificate identifiers of every entry, in document order.
    ///
    /// These are the values matched against the revocation set.
    pub fn identifiers(&self) -> Vec<&str> {
        match &self.entry {
            CertificateEntry::Vaccination(v) => v.iter().map(|e| e.id.as_str()).collect(),
            CertificateEntry::Test(t) => t.iter().map(|e| e.id.as_str()).collect(),
            CertificateEntry::Recovery(r) => r.iter().map(|e| e.id.as_str()).collect(),
            CertificateEntry::Exemption(e) => e.iter().map(|x| x.id.as_str()).collect(),
        }
    }
}

type Map = BTreeMap<MapKey, CborValue>;

fn get<'a>(map: &'a Map, key: &str) -> Option<&'a CborValue> {
    map.get(&MapKey::Text(key.to_string()))
}

fn optional_text(map: &Map, key: &str) -> Option<String> {
    get(map, key).and_then(CborValue::as_text).map(str::to_owned)
}

fn required_text(map: &Map, key: &str) -> Result<String, DecodeError> {
    optional_text(map, key)
        .ok_or_else(|| DecodeError::Certificate(format!("missing required field '{key}'")))
}

fn required_u32(map: &Map, key: &str) -> Result<u32, DecodeError> {
    get(map, key)
        .and_then(CborValue::as_i64)
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| DecodeError::Certificate(format!("missing or invalid field '{key}'")))
}

fn person_name(map: &Map) -> Result<PersonName, DecodeError> {
    let nam = get(map, "nam")
        .and_then(CborValue::as_map)
        .ok_or_else(|| DecodeError::Certificate("missing person name".into()))?;

    Ok(PersonName {
        surname: optional_text(nam, "fn"),
        standardised_surname: optional_text(nam, "fnt"),
        forename: optional_text(nam, "gn"),
        standardised_forename: optional_text(nam, "gnt"),
    })
}

fn entry_group<T>(
    map: &Map,
    key: &str,
    parse: impl Fn(&Map) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    let items = match get(map, key) {
        None => return Ok(Vec::new()),
        Some(v) => v
            .as_array()
            .ok_or_else(|| DecodeError::Certificate(format!("entry group '{key}' is not an array")))?,
    };

    items
        .iter()
        .map(|item| {
            let entry = item.as_map().ok_or_else(|| {
                DecodeError::Certificate(format!("entry in group '{key}' is not a map"))
            })?;
            parse(entry)
        })
        .collect()
}

fn vaccination_entry(map: &Map) -> Result<VaccinationEntry, DecodeError> {
    Ok(VaccinationEntry {
        target_disease: required_text(map, "tg")?,
        vaccine: optional_text(map, "vp"),
        product: optional_text(map, "mp"),
        manufacturer: optional_text(map, "ma"),
        dose_number: required_u32(map, "dn")?,
        total_doses: required_u32(map, "sd")?,
        date: required_text(map, "dt")?,
        country: required_text(map, "co")?,
        issuer: required_text(map, "is")?,
        id: required_text(map, "ci")?,
    })
}

fn test_entry(map: &Map) -> Result<TestEntry, DecodeError> {
    Ok(TestEntry {
        target_disease: required_text(map, "tg")?,
        test_type: required_text(map, "tt")?,
        name: optional_text(map, "nm"),
        manufacturer: optional_text(map, "ma"),
        sample_collected_at: required_text(map, "sc")?,
        result: required_text(map, "tr")?,
        testing_centre: optional_text(map, "tc"),
        country: required_text(map, "co")?,
        issuer: required_text(map, "is")?,
        id: required_text(map, "ci")?,
    })
}

fn recovery_entry(map: &Map) -> Result<RecoveryEntry, DecodeError> {
    Ok(RecoveryEntry {
        target_disease: required_text(map, "tg")?,
        first_positive_test: required_text(map, "fr")?,
        valid_from: required_text(map, "df")?,
        valid_until: required_text(map, "du")?,
        country: required_text(map, "co")?,
        issuer: required_text(map, "is")?,
        id: required_text(map, "ci")?,
    })
}

fn exemption_entry(map: &Map) -> Result<ExemptionEntry, DecodeError> {
    Ok(ExemptionEntry {
        target_disease: required_text(map, "tg")?,
        valid_from: optional_text(map, "df"),
        valid_until: optional_text(map, "du"),
        country: required_text(map, "co")?,
        issuer: required_text(map, "is")?,
        id: required_text(map, "ci")?,
    })
}
