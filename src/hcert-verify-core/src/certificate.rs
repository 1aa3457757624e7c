//! Typed view of the EU Digital COVID Certificate payload.
//!
//! [`HealthCertificate`] reads from the decoded [`CborValue`] and keeps it,
//! so the facts handed to the rule engine are exactly the signed payload.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cbor::CborValue;
use crate::cose::KeyId;
use crate::cwt::DecodedClaims;
use crate::error::VerifyError;

/// Highest supported payload schema major version.
pub const SUPPORTED_MAJOR_VERSION: u32 = 1;
/// Highest supported payload schema minor version.
pub const SUPPORTED_MINOR_VERSION: u32 = 3;

/// SNOMED code for "not detected".
pub const NEGATIVE_RESULT: &str = "260415000";
/// SNOMED code for "detected".
pub const POSITIVE_RESULT: &str = "260373001";

/// Which kind of entry a certificate carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateType {
    /// `v` entry.
    Vaccination,
    /// `t` entry.
    Test,
    /// `r` entry.
    Recovery,
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vaccination => "vaccination",
            Self::Test => "test",
            Self::Recovery => "recovery",
        })
    }
}

/// Test result with a fallback for codes this build does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    /// Not detected.
    Negative,
    /// Detected.
    Positive,
    /// Any other code, kept verbatim.
    Unrecognized(String),
}

impl TestResult {
    /// Map a SNOMED result code.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            NEGATIVE_RESULT => Self::Negative,
            POSITIVE_RESULT => Self::Positive,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// Holder name (`nam`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonName {
    /// `fn`
    pub family_name: Option<String>,
    /// `gn`
    pub given_name: Option<String>,
    /// `fnt` (ICAO 9303 transliteration)
    pub family_name_transliterated: Option<String>,
    /// `gnt`
    pub given_name_transliterated: Option<String>,
}

impl PersonName {
    /// "Given Family", preferring the native spelling.
    #[must_use]
    pub fn full_name(&self) -> String {
        [
            self.given_name.as_ref().or(self.given_name_transliterated.as_ref()),
            self.family_name.as_ref().or(self.family_name_transliterated.as_ref()),
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Vaccination entry (`v`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vaccination {
    /// Unique certificate identifier (`ci`).
    pub id: String,
    /// Targeted disease (`tg`).
    pub target_disease: String,
    /// Medicinal product (`mp`).
    pub product: String,
    /// Dose number (`dn`).
    pub dose_number: u32,
    /// Total doses in the series (`sd`).
    pub total_doses: u32,
    /// Vaccination date (`dt`).
    pub occurrence: Option<NaiveDate>,
    /// Country of vaccination (`co`).
    pub country: String,
}

impl Vaccination {
    /// Whether the dose completes the series.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.dose_number >= self.total_doses
    }
}

/// Test entry (`t`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEntry {
    /// Unique certificate identifier (`ci`).
    pub id: String,
    /// Targeted disease (`tg`).
    pub target_disease: String,
    /// Test type (`tt`).
    pub test_type: String,
    /// Sample collection time (`sc`).
    pub sample_collection: Option<DateTime<Utc>>,
    /// Result (`tr`).
    pub result: TestResult,
    /// Country of test (`co`).
    pub country: String,
}

/// Recovery entry (`r`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    /// Unique certificate identifier (`ci`).
    pub id: String,
    /// Targeted disease (`tg`).
    pub target_disease: String,
    /// First positive result (`fr`).
    pub first_result: Option<NaiveDate>,
    /// Valid from (`df`).
    pub valid_from: Option<NaiveDate>,
    /// Valid until (`du`).
    pub valid_until: Option<NaiveDate>,
    /// Country of test (`co`).
    pub country: String,
}

/// The single entry a certificate carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateEntry {
    /// Vaccination entry.
    Vaccination(Vaccination),
    /// Test entry.
    Test(TestEntry),
    /// Recovery entry.
    Recovery(Recovery),
}

impl CertificateEntry {
    /// Unique certificate identifier (UCI).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Vaccination(v) => &v.id,
            Self::Test(t) => &t.id,
            Self::Recovery(r) => &r.id,
        }
    }

    /// Entry kind.
    #[must_use]
    pub fn certificate_type(&self) -> CertificateType {
        match self {
            Self::Vaccination(_) => CertificateType::Vaccination,
            Self::Test(_) => CertificateType::Test,
            Self::Recovery(_) => CertificateType::Recovery,
        }
    }
}

/// A verified (or at least decoded) health certificate.
#[derive(Debug, Clone)]
pub struct HealthCertificate {
    /// Issuing country from the CWT.
    pub issuer_country: String,
    /// CWT issued-at.
    pub issued_at: Option<DateTime<Utc>>,
    /// CWT expiry.
    pub expires_at: DateTime<Utc>,
    /// Payload schema version (`ver`).
    pub version: String,
    /// Holder name.
    pub name: PersonName,
    /// Date of birth (`dob`), possibly partial (`YYYY`, `YYYY-MM`) or empty.
    pub date_of_birth: String,
    /// The carried entry.
    pub entry: CertificateEntry,
    /// Key id of the DSC that signed it. Unset until the signature is validated.
    pub signer_kid: Option<KeyId>,
    raw: CborValue,
}

impl HealthCertificate {
    /// Build the typed view from decoded claims.
    pub fn from_claims(claims: &DecodedClaims) -> Result<Self, VerifyError> {
        let payload = &claims.payload;

        let version = text(payload, "ver");
        check_version(&version)?;

        let name = payload
            .get("nam")
            .map(|nam| PersonName {
                family_name: opt_text(nam, "fn"),
                given_name: opt_text(nam, "gn"),
                family_name_transliterated: opt_text(nam, "fnt"),
                given_name_transliterated: opt_text(nam, "gnt"),
            })
            .unwrap_or_default();

        let entry = first_entry(payload)?;

        Ok(Self {
            issuer_country: claims.issuer_country.clone(),
            issued_at: claims.valid_from,
            expires_at: claims.valid_until,
            version,
            name,
            date_of_birth: text(payload, "dob"),
            entry,
            signer_kid: None,
            raw: payload.clone(),
        })
    }

    /// Entry kind.
    #[must_use]
    pub fn certificate_type(&self) -> CertificateType {
        self.entry.certificate_type()
    }

    /// Unique certificate identifier.
    #[must_use]
    pub fn uci(&self) -> &str {
        self.entry.id()
    }

    /// The underlying payload.
    #[must_use]
    pub fn payload(&self) -> &CborValue {
        &self.raw
    }

    /// Payload as JSON "certificate facts" for the rule engine.
    #[must_use]
    pub fn facts(&self) -> serde_json::Value {
        self.raw.to_json()
    }
}

fn check_version(version: &str) -> Result<(), VerifyError> {
    let mut parts = version.split('.').map(|p| p.trim().parse::<u32>());
    let major = parts.next().and_then(Result::ok);
    // A missing minor version reads as 0.
    let minor = parts.next().unwrap_or(Ok(0)).ok();
    match (major, minor) {
        (Some(major), Some(minor))
            if major <= SUPPORTED_MAJOR_VERSION && minor <= SUPPORTED_MINOR_VERSION =>
        {
            Ok(())
        }
        _ => Err(VerifyError::decode(format!(
            "unsupported certificate version {version:?}"
        ))),
    }
}

fn first_entry(payload: &CborValue) -> Result<CertificateEntry, VerifyError> {
    let first = |key: &str| {
        payload
            .get(key)
            .and_then(CborValue::as_array)
            .and_then(<[CborValue]>::first)
    };

    if let Some(v) = first("v") {
        return Ok(CertificateEntry::Vaccination(Vaccination {
            id: text(v, "ci"),
            target_disease: text(v, "tg"),
            product: text(v, "mp"),
            dose_number: count(v, "dn"),
            total_doses: count(v, "sd"),
            occurrence: date(v, "dt"),
            country: text(v, "co"),
        }));
    }
    if let Some(t) = first("t") {
        return Ok(CertificateEntry::Test(TestEntry {
            id: text(t, "ci"),
            target_disease: text(t, "tg"),
            test_type: text(t, "tt"),
            sample_collection: t
                .get("sc")
                .and_then(CborValue::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc)),
            result: TestResult::from_code(&text(t, "tr")),
            country: text(t, "co"),
        }));
    }
    if let Some(r) = first("r") {
        return Ok(CertificateEntry::Recovery(Recovery {
            id: text(r, "ci"),
            target_disease: text(r, "tg"),
            first_result: date(r, "fr"),
            valid_from: date(r, "df"),
            valid_until: date(r, "du"),
            country: text(r, "co"),
        }));
    }

    Err(VerifyError::decode(
        "certificate carries no vaccination, test or recovery entry",
    ))
}

fn opt_text(map: &CborValue, key: &str) -> Option<String> {
    map.get(key).and_then(CborValue::as_str).map(str::to_string)
}

fn text(map: &CborValue, key: &str) -> String {
    opt_text(map, key).unwrap_or_default()
}

fn count(map: &CborValue, key: &str) -> u32 {
    map.get(key)
        .and_then(CborValue::as_i64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// Accepts `YYYY-MM-DD` optionally followed by a time part.
fn date(map: &CborValue, key: &str) -> Option<NaiveDate> {
    let s = map.get(key).and_then(CborValue::as_str)?;
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}
