//! Verification engine.
//!
//! This module implements the complete verification flow:
//! 1. QR decoding (Base45, zlib, COSE_Sign1)
//! 2. Signature validation against the trust registry
//! 3. Revocation lookup
//! 4. Acceptance and invalidation rules
//! 5. Verdict
//!
//! ## Security Properties
//!
//! - Codec, expiry and signature failures abort with an error, never a verdict
//! - A revoked hash or failed rule always yields `Invalid`
//! - An unreachable revocation index follows the configured policy

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::certificate::{CertificateType, HealthCertificate};
use crate::codec::{decode_raw_token, parse_cose_sign1};
use crate::config::VerifyConfig;
use crate::cwt::DecodedClaims;
use crate::error::VerifyError;
use crate::revocation::{
    RevocationCandidate, RevocationIndex, RevocationOutcome, RevocationPolicy, RevocationSource,
};
use crate::rules::{
    evaluate_immunity_status, evaluate_mask_status, ImmunityStatus, MaskStatus, RuleEvaluator,
    RuleOutcome, RuleRepository, RuleResult, RulesValidator, ValidationType,
};
use crate::trust::{TrustListSource, TrustRegistry};
use crate::validator::{SignatureValidator, ValidatedToken};

/// Language used for rule descriptions in verdict reasons.
const REASON_LANGUAGE: &str = "en";

/// Final answer for one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "camelCase")]
pub enum Verdict {
    /// Signature, revocation and all rules passed.
    Valid,
    /// Revoked, or at least one rule failed.
    Invalid {
        /// Human readable reasons.
        reasons: Vec<String>,
    },
    /// Nothing failed but something could not be checked.
    Incomplete {
        /// Human readable reasons.
        reasons: Vec<String>,
    },
}

impl Verdict {
    /// Check if the verdict is [`Verdict::Valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Reasons attached to the verdict.
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        match self {
            Self::Valid => &[],
            Self::Invalid { reasons } | Self::Incomplete { reasons } => reasons,
        }
    }
}

/// Outcome of one rule as reported to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleReport {
    /// Rule identifier.
    pub identifier: String,
    /// Rule version.
    pub version: String,
    /// Country that published the rule.
    pub country: String,
    /// Outcome.
    pub outcome: RuleOutcome,
    /// English description of the rule.
    pub description: String,
    /// Evaluator message for open rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&RuleResult> for RuleReport {
    fn from(result: &RuleResult) -> Self {
        Self {
            identifier: result.rule.identifier.clone(),
            version: result.rule.version.clone(),
            country: result.rule.country.clone(),
            outcome: result.outcome,
            description: result.rule.description_for(REASON_LANGUAGE).to_string(),
            message: result.message.clone(),
        }
    }
}

/// Everything learned while verifying one certificate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    /// The verdict.
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Issuing country from the CWT.
    pub issuer_country: String,
    /// Certificate kind.
    pub certificate_type: CertificateType,
    /// Unique certificate identifier.
    pub uci: String,
    /// Key identifier of the DSC that validated the signature, base64.
    pub signer_kid: String,
    /// Certificate expiry.
    pub expires_at: DateTime<Utc>,
    /// Revocation lookup result. `None` if no index is configured.
    pub revocation: Option<RevocationOutcome>,
    /// Per-rule outcomes.
    pub rules: Vec<RuleReport>,
    /// The decoded certificate.
    #[serde(skip)]
    pub certificate: HealthCertificate,
}

/// Fold revocation and rule results into a verdict.
///
/// Any revoked hash or failed rule makes the verdict `Invalid`. Otherwise
/// any open rule or unavailable index makes it `Incomplete`, except that
/// under [`RevocationPolicy::FailClosed`] an unavailable index is `Invalid`.
#[must_use]
pub fn decide(
    revocation: Option<&RevocationOutcome>,
    rules: &[RuleResult],
    policy: RevocationPolicy,
) -> Verdict {
    let mut invalid = Vec::new();
    let mut incomplete = Vec::new();

    match revocation {
        Some(RevocationOutcome::Revoked { variant }) => {
            invalid.push(format!("certificate is revoked ({variant} hash)"));
        }
        Some(RevocationOutcome::Unavailable { reason }) => {
            let message = format!("revocation status unknown: {reason}");
            match policy {
                RevocationPolicy::FailClosed => invalid.push(message),
                RevocationPolicy::FailOpen => incomplete.push(message),
            }
        }
        Some(RevocationOutcome::NotRevoked) | None => {}
    }

    for result in rules {
        let rule = &result.rule;
        match result.outcome {
            RuleOutcome::Passed => {}
            RuleOutcome::Failed => invalid.push(format!(
                "rule {} failed: {}",
                rule.identifier,
                rule.description_for(REASON_LANGUAGE)
            )),
            RuleOutcome::Open => incomplete.push(
                result
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("rule {} could not be evaluated", rule.identifier)),
            ),
        }
    }

    if !invalid.is_empty() {
        Verdict::Invalid { reasons: invalid }
    } else if !incomplete.is_empty() {
        Verdict::Incomplete { reasons: incomplete }
    } else {
        Verdict::Valid
    }
}

/// The verification engine.
///
/// This is the primary entry point for verifying scanned certificates.
pub struct VerificationEngine {
    /// Configuration.
    config: VerifyConfig,
    /// Trusted DSCs.
    trust: Arc<TrustRegistry>,
    /// Revocation lookup, if a source is configured.
    revocation: Option<RevocationIndex>,
    /// Business rules.
    rules: Arc<dyn RuleRepository>,
    /// Rule logic interpreter.
    evaluator: Arc<dyn RuleEvaluator>,
}

impl VerificationEngine {
    /// Create an engine without revocation checks.
    pub fn new(
        config: VerifyConfig,
        trust: Arc<TrustRegistry>,
        rules: Arc<dyn RuleRepository>,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> Self {
        info!(
            country = %config.acceptance_country,
            region = ?config.region,
            policy = ?config.revocation_policy,
            trusted = trust.len(),
            "VerificationEngine: initialized"
        );
        Self {
            config,
            trust,
            revocation: None,
            rules,
            evaluator,
        }
    }

    /// Consult `source` for revocations, bounded by the configured timeout.
    #[must_use]
    pub fn with_revocation(mut self, source: Arc<dyn RevocationSource>) -> Self {
        self.revocation = Some(RevocationIndex::new(source).with_timeout(self.config.source_timeout));
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Trust registry used for signature validation.
    pub fn trust(&self) -> &Arc<TrustRegistry> {
        &self.trust
    }

    /// Decode `qr_text` into CWT claims without checking the signature.
    pub fn decode(&self, qr_text: &str) -> Result<DecodedClaims, VerifyError> {
        let cose = decode_raw_token(
            qr_text,
            &self.config.qr_prefix,
            self.config.max_decompressed_size,
        )?;
        let token = parse_cose_sign1(&cose)?;
        DecodedClaims::decode(token.payload())
    }

    /// Decode and validate the signature of `qr_text` at `now`.
    pub fn validate_signature(
        &self,
        qr_text: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, VerifyError> {
        let cose = decode_raw_token(
            qr_text,
            &self.config.qr_prefix,
            self.config.max_decompressed_size,
        )?;
        let token = parse_cose_sign1(&cose)?;
        SignatureValidator::new(&self.trust)
            .with_clock_skew(self.config.clock_skew)
            .validate(&token, now)
    }

    /// Verify `qr_text` at `now`.
    ///
    /// # Errors
    ///
    /// Codec, expiry and signature failures are returned as errors. A
    /// [`VerifyError::BadSignature`] may be retried once after a trust list
    /// refresh, see [`Self::verify_with_refresh`].
    #[instrument(skip(self, qr_text))]
    pub async fn verify(
        &self,
        qr_text: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationReport, VerifyError> {
        let validated = self.validate_signature(qr_text, now)?;

        let revocation = match &self.revocation {
            Some(index) => {
                let candidate = RevocationCandidate::from_validated(&validated);
                Some(index.check(&candidate).await)
            }
            None => {
                debug!("No revocation source configured");
                None
            }
        };

        let results = self
            .rules_validator()
            .validate(&validated.certificate, ValidationType::Rules, now);

        let verdict = decide(revocation.as_ref(), &results, self.config.revocation_policy);
        match &verdict {
            Verdict::Valid => info!(uci = %validated.certificate.uci(), "Certificate valid"),
            Verdict::Invalid { reasons } => {
                warn!(uci = %validated.certificate.uci(), ?reasons, "Certificate invalid");
            }
            Verdict::Incomplete { reasons } => {
                warn!(uci = %validated.certificate.uci(), ?reasons, "Verification incomplete");
            }
        }

        let certificate = validated.certificate;
        Ok(VerificationReport {
            verdict,
            issuer_country: certificate.issuer_country.clone(),
            certificate_type: certificate.certificate_type(),
            uci: certificate.uci().to_string(),
            signer_kid: validated.signer.kid.to_base64(),
            expires_at: certificate.expires_at,
            revocation,
            rules: results.iter().map(RuleReport::from).collect(),
            certificate,
        })
    }

    /// Verify, refreshing the trust list from `source` and retrying once if
    /// no trusted certificate validated the signature.
    pub async fn verify_with_refresh(
        &self,
        qr_text: &str,
        now: DateTime<Utc>,
        source: &dyn TrustListSource,
    ) -> Result<VerificationReport, VerifyError> {
        match self.verify(qr_text, now).await {
            Err(e) if e.may_refresh_trust_list() => {
                info!(error = %e, "Refreshing trust list before retry");
                self.trust.refresh(source, self.config.source_timeout).await?;
                self.verify(qr_text, now).await
            }
            other => other,
        }
    }

    /// Mask status of `certificate` in the configured country and region.
    pub fn mask_status(&self, certificate: &HealthCertificate, now: DateTime<Utc>) -> MaskStatus {
        evaluate_mask_status(&self.rules_validator(), certificate, now)
    }

    /// Immunity status of `certificate` in the configured country and region.
    pub fn immunity_status(
        &self,
        certificate: Option<&HealthCertificate>,
        now: DateTime<Utc>,
    ) -> ImmunityStatus {
        evaluate_immunity_status(&self.rules_validator(), certificate, now)
    }

    fn rules_validator(&self) -> RulesValidator<'_> {
        RulesValidator::new(
            self.rules.as_ref(),
            self.evaluator.as_ref(),
            self.config.acceptance_country.clone(),
        )
        .with_region(self.config.region.clone())
    }
}
