//! CBOR Web Token (RFC 8392) claims carried by health certificates.

use chrono::{DateTime, Utc};

use crate::cbor::CborValue;
use crate::error::VerifyError;

const CLAIM_ISS: i64 = 1;
const CLAIM_EXP: i64 = 4;
const CLAIM_IAT: i64 = 6;
const CLAIM_HCERT: i64 = -260;
const HCERT_EU_DCC: i64 = 1;

/// Claims decoded from a COSE payload before its signature is checked.
#[derive(Debug, Clone)]
pub struct DecodedClaims {
    /// Issuing country (`iss`); empty when the issuer omitted it.
    pub issuer_country: String,
    /// Issued-at time (`iat`).
    pub valid_from: Option<DateTime<Utc>>,
    /// Expiration time (`exp`).
    pub valid_until: DateTime<Utc>,
    /// The EU DCC payload map (`-260` → `1`).
    pub payload: CborValue,
}

impl DecodedClaims {
    /// Decode CWT claims from COSE payload bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, VerifyError> {
        let claims = CborValue::decode(bytes)?;
        if claims.entries().is_none() {
            return Err(VerifyError::decode("CWT claims are not a map"));
        }

        let issuer_country = claims
            .get_int(CLAIM_ISS)
            .and_then(CborValue::as_str)
            .unwrap_or_default()
            .to_string();

        let valid_until = claims
            .get_int(CLAIM_EXP)
            .map(timestamp)
            .transpose()?
            .ok_or_else(|| VerifyError::decode("CWT has no expiration claim"))?;

        let valid_from = claims.get_int(CLAIM_IAT).map(timestamp).transpose()?;

        let payload = claims
            .get_int(CLAIM_HCERT)
            .and_then(|hcert| hcert.get_int(HCERT_EU_DCC))
            .filter(|p| p.entries().is_some())
            .cloned()
            .ok_or_else(|| VerifyError::decode("CWT has no health certificate claim"))?;

        Ok(Self {
            issuer_country,
            valid_from,
            valid_until,
            payload,
        })
    }

    /// Whether `exp` lies before `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until < now
    }

    /// Claims as JSON, with the payload nested under `hcert`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "iss": self.issuer_country,
            "iat": self.valid_from.map(|t| t.timestamp()),
            "exp": self.valid_until.timestamp(),
            "hcert": self.payload.to_json(),
        })
    }
}

fn timestamp(value: &CborValue) -> Result<DateTime<Utc>, VerifyError> {
    let secs = match value {
        CborValue::Integer(i) => *i,
        CborValue::Float(f) if f.is_finite() => f.trunc() as i64,
        other => {
            return Err(VerifyError::decode(format!(
                "timestamp claim is not numeric: {other:?}"
            )))
        }
    };
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| VerifyError::decode(format!("timestamp {secs} out of range")))
}

/// Build CWT claim bytes. Used to mint fixtures.
pub fn encode_claims(
    issuer_country: &str,
    issued_at: i64,
    expires_at: i64,
    payload: CborValue,
) -> Result<Vec<u8>, VerifyError> {
    CborValue::Map(vec![
        (CborValue::Integer(CLAIM_ISS), CborValue::Text(issuer_country.to_string())),
        (CborValue::Integer(CLAIM_IAT), CborValue::Integer(issued_at)),
        (CborValue::Integer(CLAIM_EXP), CborValue::Integer(expires_at)),
        (
            CborValue::Integer(CLAIM_HCERT),
            CborValue::Map(vec![(CborValue::Integer(HCERT_EU_DCC), payload)]),
        ),
    ])
    .to_vec()
}
