//! Signature validation against X.509 DSCs and trust list documents.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use hcert_crypto::{P256Signer, PssSigner, Signer};
use hcert_verify_core::{
    codec, KeyId, SignatureValidator, TrustList, TrustListSource, TrustRegistry,
    TrustedCertificate, VerifyError,
};

use crate::support::{mint, trusted, vaccination_payload, KID};

struct Dsc {
    der: Vec<u8>,
    signer: P256Signer,
}

fn dsc() -> Dsc {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["dsc.example.de".to_string()]).unwrap();
    Dsc {
        der: cert.der().to_vec(),
        signer: P256Signer::from_pkcs8_der(&key_pair.serialize_der()).unwrap(),
    }
}

fn validate(registry: &TrustRegistry, qr: &str) -> Result<hcert_verify_core::ValidatedToken, VerifyError> {
    let cose = codec::decode_raw_token(qr, "HC1:", 64 * 1024)?;
    let token = codec::parse_cose_sign1(&cose)?;
    SignatureValidator::new(registry).validate(&token, Utc::now())
}

#[test]
fn test_x509_dsc_validates() {
    let dsc = dsc();
    let kid = TrustedCertificate::derive_kid(&dsc.der);
    let cert = TrustedCertificate::from_der("DE", kid.clone(), &dsc.der).unwrap();
    assert!(cert.is_valid_at(Utc::now()));

    let registry = TrustRegistry::with_certificates([cert]);
    let qr = mint(&dsc.signer, kid.as_bytes(), "DE", 3600, vaccination_payload("URN:UVCI:X509"));
    let validated = validate(&registry, &qr).unwrap();
    assert_eq!(validated.signer.kid, kid);
    assert_eq!(validated.kid, Some(kid));
}

#[test]
fn test_trust_list_document() {
    let dsc = dsc();
    let kid = TrustedCertificate::derive_kid(&dsc.der);
    let document = serde_json::json!({
        "certificates": [
            {"certificateType": "DSC", "country": "DE", "kid": kid.to_base64(), "rawData": STANDARD.encode(&dsc.der)},
            {"certificateType": "DSC", "country": "FR", "kid": "AAAAAAAAAAA=", "rawData": "bm90IGEgY2VydA=="},
            {"certificateType": "CSCA", "country": "DE", "kid": "", "rawData": STANDARD.encode(&dsc.der)}
        ]
    });
    let certs = TrustList::from_json(&document.to_string()).unwrap();
    assert_eq!(certs.len(), 1);

    let registry = TrustRegistry::with_certificates(certs);
    let qr = mint(&dsc.signer, kid.as_bytes(), "DE", 3600, vaccination_payload("URN:UVCI:LIST"));
    assert!(validate(&registry, &qr).is_ok());
}

#[test]
fn test_ps256_token() {
    let signer = PssSigner::random(2048).unwrap();
    let registry = TrustRegistry::with_certificates([TrustedCertificate::new(
        "DE",
        KeyId::new(&KID),
        signer.public_key().unwrap(),
    )]);
    let qr = mint(&signer, &KID, "DE", 3600, vaccination_payload("URN:UVCI:PSS"));
    let validated = validate(&registry, &qr).unwrap();
    assert_eq!(validated.algorithm, hcert_crypto::SignatureAlgorithm::Ps256);
}

#[test]
fn test_wrong_key_is_bad_signature() {
    let signer = P256Signer::random();
    let impostor = P256Signer::random();
    let registry = TrustRegistry::with_certificates([
        trusted(&signer, "DE", &KID),
        trusted(&impostor, "DE", &[9; 8]),
    ]);

    let forged = mint(&P256Signer::random(), &KID, "DE", 3600, vaccination_payload("URN:UVCI:F"));
    let err = validate(&registry, &forged).unwrap_err();
    assert!(err.may_refresh_trust_list());

    // Kid points at the wrong key but another trusted key signed it
    let misfiled = mint(&impostor, &KID, "DE", 3600, vaccination_payload("URN:UVCI:M"));
    assert!(validate(&registry, &misfiled).is_err());
}

#[test]
fn test_unknown_kid_falls_back_to_all() {
    let signer = P256Signer::random();
    let registry = TrustRegistry::with_certificates([trusted(&signer, "DE", &KID)]);
    let qr = mint(&signer, &[1; 8], "DE", 3600, vaccination_payload("URN:UVCI:K"));
    assert!(validate(&registry, &qr).is_ok());
}

struct StaticTrustList(String);

#[async_trait]
impl TrustListSource for StaticTrustList {
    async fn fetch_trust_list(&self) -> Result<String, VerifyError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_refresh_replaces_snapshot() {
    let old = P256Signer::random();
    let registry = Arc::new(TrustRegistry::with_certificates([trusted(&old, "DE", &KID)]));
    let before = registry.snapshot();

    let dsc = dsc();
    let kid = TrustedCertificate::derive_kid(&dsc.der);
    let document = serde_json::json!({
        "certificates": [{"country": "DE", "kid": kid.to_base64(), "rawData": STANDARD.encode(&dsc.der)}]
    });
    let count = registry
        .refresh(&StaticTrustList(document.to_string()), std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(count, 1);

    // Readers holding the old generation keep it
    assert_eq!(before.len(), 1);
    assert!(registry.find_by_kid(&KeyId::new(&KID)).is_empty());
    assert_eq!(registry.find_by_kid(&kid).len(), 1);
}

#[tokio::test]
async fn test_empty_refresh_keeps_registry() {
    let signer = P256Signer::random();
    let registry = TrustRegistry::with_certificates([trusted(&signer, "DE", &KID)]);
    let err = registry
        .refresh(&StaticTrustList(r#"{"certificates": []}"#.into()), std::time::Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::TrustList { .. }));
    assert_eq!(registry.len(), 1);
}
