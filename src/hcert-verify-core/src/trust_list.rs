//! DSC trust list document parsing.
//!
//! ```json
//! {"certificates": [
//!   {"certificateType": "DSC", "country": "DE", "kid": "<base64>", "rawData": "<base64 DER>"}
//! ]}
//! ```
//!
//! `rawData` may also be a PEM block. A malformed entry is skipped with a
//! warning; only a malformed document fails as a whole.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cose::KeyId;
use crate::error::VerifyError;
use crate::trust::TrustedCertificate;

const DSC_TYPE: &str = "DSC";

#[derive(Debug, Deserialize)]
struct DscListDocument {
    #[serde(default)]
    certificates: Vec<DscListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DscListEntry {
    #[serde(default)]
    certificate_type: Option<String>,
    country: String,
    #[serde(default)]
    kid: String,
    raw_data: String,
}

/// Parser for the DSC trust list document.
pub struct TrustList;

impl TrustList {
    /// Parse the document into trusted certificates, in document order.
    pub fn from_json(json: &str) -> Result<Vec<TrustedCertificate>, VerifyError> {
        let document: DscListDocument = serde_json::from_str(json)
            .map_err(|e| VerifyError::trust_list(format!("invalid trust list JSON: {e}")))?;

        let total = document.certificates.len();
        let certs: Vec<_> = document
            .certificates
            .into_iter()
            .filter(|entry| {
                entry
                    .certificate_type
                    .as_deref()
                    .map_or(true, |t| t.eq_ignore_ascii_case(DSC_TYPE))
            })
            .filter_map(|entry| match parse_entry(&entry) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    warn!(country = %entry.country, kid = %entry.kid, error = %e, "Skipping trust list entry");
                    None
                }
            })
            .collect();

        debug!(total, accepted = certs.len(), "Parsed trust list");
        Ok(certs)
    }
}

fn parse_entry(entry: &DscListEntry) -> Result<TrustedCertificate, VerifyError> {
    let der = decode_raw_data(&entry.raw_data)?;
    let kid = if entry.kid.trim().is_empty() {
        TrustedCertificate::derive_kid(&der)
    } else {
        KeyId::from_base64(&entry.kid)?
    };
    TrustedCertificate::from_der(entry.country.trim().to_ascii_uppercase(), kid, &der)
}

fn decode_raw_data(raw: &str) -> Result<Vec<u8>, VerifyError> {
    let raw = raw.trim();
    if raw.starts_with("-----BEGIN") {
        let (_, pem) = x509_parser::pem::parse_x509_pem(raw.as_bytes())
            .map_err(|e| VerifyError::trust_list(format!("invalid PEM: {e}")))?;
        return Ok(pem.contents);
    }

    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| VerifyError::trust_list(format!("invalid base64 rawData: {e}")))
}
