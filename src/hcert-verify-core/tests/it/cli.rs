//! `hcert-verify` binary: exit codes and JSON output.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hcert_crypto::P256Signer;
use hcert_verify_core::TrustedCertificate;
use predicates::prelude::*;
use tempfile::TempDir;

use crate::support::{mint, rule_json, vaccination_payload};

fn hcert_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hcert-verify"));
    cmd.env("RUST_LOG", "error");
    cmd
}

/// A DSC trust list on disk and a QR signed by that DSC.
struct Fixture {
    dir: TempDir,
    trust_list: PathBuf,
    qr: String,
}

impl Fixture {
    fn new(uci: &str) -> Self {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["cli.example.de".to_string()]).unwrap();
        let signer = P256Signer::from_pkcs8_der(&key_pair.serialize_der()).unwrap();
        let kid = TrustedCertificate::derive_kid(cert.der());
        let qr = mint(&signer, kid.as_bytes(), "DE", 3600, vaccination_payload(uci));

        let dir = TempDir::new().unwrap();
        let trust_list = dir.path().join("dsc.json");
        let document = serde_json::json!({
            "certificates": [{
                "country": "DE",
                "kid": kid.to_base64(),
                "rawData": STANDARD.encode(cert.der())
            }]
        });
        fs::write(&trust_list, document.to_string()).unwrap();

        Self {
            dir,
            trust_list,
            qr,
        }
    }

    fn rules(&self, rules: &[serde_json::Value]) -> PathBuf {
        let path = self.dir.path().join("rules.json");
        fs::write(&path, serde_json::Value::from(rules.to_vec()).to_string()).unwrap();
        path
    }

    fn verify(&self, rules: Option<&PathBuf>) -> Command {
        let mut cmd = hcert_cmd();
        cmd.args(["--format", "json", "verify", &self.qr])
            .args(["--trust-list", self.trust_list.to_str().unwrap()])
            .args(["--country", "DE"]);
        if let Some(rules) = rules {
            cmd.args(["--rules", rules.to_str().unwrap()]);
        }
        cmd
    }
}

#[test]
fn test_valid_exits_zero() {
    let fixture = Fixture::new("URN:UVCI:CLI/VALID");
    let rules = fixture.rules(&[rule_json("VR-DE-0001", "1.0.0", serde_json::json!(true))]);

    fixture
        .verify(Some(&rules))
        .assert()
        .code(0)
        .stdout(predicate::str::contains("\"verdict\": \"valid\""))
        .stdout(predicate::str::contains("URN:UVCI:CLI/VALID"));
}

#[test]
fn test_failed_rule_exits_one() {
    let fixture = Fixture::new("URN:UVCI:CLI/INVALID");
    let rules = fixture.rules(&[
        rule_json("VR-DE-0001", "1.0.0", serde_json::json!(true)),
        rule_json("VR-DE-0002", "1.0.0", serde_json::json!(false)),
    ]);

    fixture
        .verify(Some(&rules))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"verdict\": \"invalid\""))
        .stdout(predicate::str::contains("VR-DE-0002"));
}

#[test]
fn test_open_rule_exits_two() {
    let fixture = Fixture::new("URN:UVCI:CLI/OPEN");
    let rules = fixture.rules(&[rule_json(
        "VR-DE-0003",
        "1.0.0",
        serde_json::json!({"var": "payload.v.0.dn"}),
    )]);

    fixture
        .verify(Some(&rules))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"verdict\": \"incomplete\""));
}

#[test]
fn test_untrusted_signer_reports_error() {
    let fixture = Fixture::new("URN:UVCI:CLI/ERROR");
    let empty = fixture.dir.path().join("empty.json");
    fs::write(&empty, r#"{"certificates": []}"#).unwrap();

    hcert_cmd()
        .args(["--format", "json", "verify", &fixture.qr])
        .args(["--trust-list", empty.to_str().unwrap()])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"error\""));
}

#[test]
fn test_decode_json() {
    let fixture = Fixture::new("URN:UVCI:CLI/DECODE");

    hcert_cmd()
        .args(["--format", "json", "decode", &fixture.qr])
        .assert()
        .success()
        .stdout(predicate::str::contains("URN:UVCI:CLI/DECODE"));
}
