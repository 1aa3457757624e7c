//! Full verification flow from QR text to verdict.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use hcert_crypto::P256Signer;
use hcert_verify_core::{
    group_certificates, ImmunityStatus, InMemoryRuleRepository, LiteralEvaluator,
    LocalRevocationStore, MaskStatus, Rule, RuleEvaluator, RuleType, TrustListSource, TrustRegistry,
    TrustedCertificate, Verdict, VerificationEngine, VerifyConfig, VerifyError,
};

use crate::support::{mint, rule, trusted, vaccination_payload, KID};

fn engine(registry: TrustRegistry, rules: Vec<Rule>) -> VerificationEngine {
    VerificationEngine::new(
        VerifyConfig::default(),
        Arc::new(registry),
        Arc::new(InMemoryRuleRepository::with_rules(rules)),
        Arc::new(LiteralEvaluator),
    )
    .with_revocation(Arc::new(LocalRevocationStore::new()))
}

#[tokio::test]
async fn test_valid_then_bad_signature() {
    let signer = P256Signer::random();
    let qr = mint(&signer, &KID, "DE", 3600, vaccination_payload("URN:UVCI:01DE/E2E"));

    let trusted_engine = engine(
        TrustRegistry::with_certificates([trusted(&signer, "DE", &KID)]),
        vec![rule("VR-DE-0001", "1.0.0", true)],
    );
    let report = trusted_engine.verify(&qr, Utc::now()).await.unwrap();
    assert_eq!(report.verdict, Verdict::Valid);
    assert_eq!(report.signer_kid, STANDARD.encode(KID));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["verdict"], "valid");
    assert_eq!(json["revocation"]["status"], "notRevoked");

    let empty_engine = engine(TrustRegistry::new(), Vec::new());
    let err = empty_engine.verify(&qr, Utc::now()).await.unwrap_err();
    assert!(matches!(err, VerifyError::BadSignature { .. }));
}

/// Records the `external.kid` each rule is evaluated with.
#[derive(Default)]
struct KidRecorder {
    seen: std::sync::Mutex<Vec<String>>,
}

impl RuleEvaluator for KidRecorder {
    fn evaluate(
        &self,
        _logic: &serde_json::Value,
        data: &serde_json::Value,
    ) -> Result<bool, VerifyError> {
        let kid = data["external"]["kid"].as_str().unwrap_or_default().to_string();
        self.seen.lock().unwrap().push(kid);
        Ok(true)
    }
}

#[tokio::test]
async fn test_rules_see_signer_kid() {
    let signer = P256Signer::random();
    // Token kid unknown to the registry: the signer is found by fallback
    let qr = mint(&signer, &[9; 8], "DE", 3600, vaccination_payload("URN:UVCI:KID"));
    let recorder = Arc::new(KidRecorder::default());
    let engine = VerificationEngine::new(
        VerifyConfig::default(),
        Arc::new(TrustRegistry::with_certificates([trusted(&signer, "DE", &KID)])),
        Arc::new(InMemoryRuleRepository::with_rules([
            rule("VR-DE-0001", "1.0.0", true),
            rule("VR-DE-0002", "1.0.0", true),
        ])),
        recorder.clone(),
    );

    let report = engine.verify(&qr, Utc::now()).await.unwrap();
    assert_eq!(report.verdict, Verdict::Valid);
    assert_eq!(
        *recorder.seen.lock().unwrap(),
        vec![STANDARD.encode(KID), STANDARD.encode(KID)]
    );
}

#[tokio::test]
async fn test_expired_before_signature() {
    let signer = P256Signer::random();
    let qr = mint(&signer, &KID, "DE", -3600, vaccination_payload("URN:UVCI:OLD"));
    // No trust at all: expiry must still be reported first
    let err = engine(TrustRegistry::new(), Vec::new())
        .verify(&qr, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Expired { .. }));
    assert!(!err.may_refresh_trust_list());
}

#[tokio::test]
async fn test_failed_rule_is_invalid() {
    let signer = P256Signer::random();
    let qr = mint(&signer, &KID, "DE", 3600, vaccination_payload("URN:UVCI:RULE"));
    let engine = engine(
        TrustRegistry::with_certificates([trusted(&signer, "DE", &KID)]),
        vec![rule("VR-DE-0001", "1.0.0", true), rule("VR-DE-0002", "1.0.0", false)],
    );
    let report = engine.verify(&qr, Utc::now()).await.unwrap();
    match report.verdict {
        Verdict::Invalid { reasons } => {
            assert_eq!(reasons.len(), 1);
            assert!(reasons[0].contains("VR-DE-0002"));
        }
        other => panic!("expected invalid, got {other:?}"),
    }
}

struct RotatedTrustList(String);

#[async_trait]
impl TrustListSource for RotatedTrustList {
    async fn fetch_trust_list(&self) -> Result<String, VerifyError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_refresh_and_retry_once() {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["rotated.example.de".to_string()]).unwrap();
    let signer = P256Signer::from_pkcs8_der(&key_pair.serialize_der()).unwrap();
    let kid = TrustedCertificate::derive_kid(cert.der());
    let qr = mint(&signer, kid.as_bytes(), "DE", 3600, vaccination_payload("URN:UVCI:ROT"));

    let stale = P256Signer::random();
    let engine = engine(
        TrustRegistry::with_certificates([trusted(&stale, "DE", &KID)]),
        Vec::new(),
    );
    let document = serde_json::json!({
        "certificates": [{"country": "DE", "kid": kid.to_base64(), "rawData": STANDARD.encode(cert.der())}]
    });

    let report = engine
        .verify_with_refresh(&qr, Utc::now(), &RotatedTrustList(document.to_string()))
        .await
        .unwrap();
    assert!(report.verdict.is_valid());
    assert_eq!(engine.trust().len(), 1);
}

#[tokio::test]
async fn test_status_rules_and_grouping() {
    let signer = P256Signer::random();
    let mut mask = rule("MR-DE-0001", "1.0.0", true);
    mask.rule_type = RuleType::Mask;
    let mut immunity = rule("IS-DE-0001", "1.0.0", true);
    immunity.rule_type = RuleType::ImmunityStatusC2;

    let engine = engine(
        TrustRegistry::with_certificates([trusted(&signer, "DE", &KID)]),
        vec![mask, immunity],
    );
    let now = Utc::now();

    let certificates: Vec<_> = ["URN:UVCI:A", "URN:UVCI:B"]
        .iter()
        .map(|uci| {
            let qr = mint(&signer, &KID, "DE", 3600, vaccination_payload(uci));
            engine.validate_signature(&qr, now).unwrap().certificate
        })
        .collect();

    let groups = group_certificates(certificates);
    assert_eq!(groups.len(), 1);
    let latest = groups[0].latest_vaccination(now).unwrap();

    assert_eq!(engine.mask_status(latest, now), MaskStatus::NotRequired);
    assert_eq!(engine.immunity_status(Some(latest), now), ImmunityStatus::Full);
    assert_eq!(engine.immunity_status(None, now), ImmunityStatus::Invalid);
}
