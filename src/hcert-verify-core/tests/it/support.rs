//! Fixtures shared by the integration tests.

use chrono::Utc;
use hcert_crypto::{P256Signer, Signer};
use hcert_verify_core::cbor::{text_map, CborValue};
use hcert_verify_core::cose::sign;
use hcert_verify_core::cwt::encode_claims;
use hcert_verify_core::{encode_raw_token, KeyId, Rule, TrustedCertificate};

pub const KID: [u8; 8] = [0xf5, 0xc5, 0x97, 0x0c, 0x30, 0x39, 0xd8, 0x54];

/// Payload of a completed two-dose vaccination.
pub fn vaccination_payload(uci: &str) -> CborValue {
    text_map([
        ("ver", "1.3.0".into()),
        (
            "nam",
            text_map([("fnt", "MUSTERMANN".into()), ("gnt", "ERIKA".into())]),
        ),
        ("dob", "1964-08-12".into()),
        (
            "v",
            CborValue::Array(vec![text_map([
                ("tg", "840539006".into()),
                ("mp", "EU/1/20/1528".into()),
                ("dn", CborValue::Integer(2)),
                ("sd", CborValue::Integer(2)),
                ("dt", "2021-05-29".into()),
                ("co", "DE".into()),
                ("ci", uci.into()),
            ])]),
        ),
    ])
}

/// QR text of a token signed by `signer`, expiring `ttl_secs` from now.
pub fn mint(signer: &dyn Signer, kid: &[u8], issuer: &str, ttl_secs: i64, payload: CborValue) -> String {
    let now = Utc::now().timestamp();
    let cwt = encode_claims(issuer, now - 60, now + ttl_secs, payload).unwrap();
    encode_raw_token(&sign(signer, kid, &cwt).unwrap(), "HC1:").unwrap()
}

/// A bare trusted key for `signer`.
pub fn trusted(signer: &P256Signer, country: &str, kid: &[u8]) -> TrustedCertificate {
    TrustedCertificate::new(country, KeyId::new(kid), signer.public_key().unwrap())
}

/// A rule document as published by a rule source.
pub fn rule_json(identifier: &str, version: &str, logic: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "Identifier": identifier,
        "Type": "Acceptance",
        "Country": "DE",
        "Version": version,
        "SchemaVersion": "1.0.0",
        "Engine": "CERTLOGIC",
        "EngineVersion": "0.7.5",
        "CertificateType": "Vaccination",
        "Description": [{"lang": "en", "desc": format!("{identifier} must hold.")}],
        "ValidFrom": "2021-07-01T00:00:00Z",
        "ValidTo": "2030-06-01T00:00:00Z",
        "AffectedFields": ["v.0.dn"],
        "Logic": logic
    })
}

pub fn rule(identifier: &str, version: &str, logic: bool) -> Rule {
    serde_json::from_value(rule_json(identifier, version, serde_json::Value::Bool(logic))).unwrap()
}
