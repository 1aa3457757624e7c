//! Rule evaluation.
//!
//! The logic language itself is a collaborator behind [`RuleEvaluator`];
//! this module feeds it the certificate facts plus [`ExternalParameters`]
//! and turns its answers into per-rule outcomes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::repository::RuleRepository;
use super::selector::RuleSelector;
use super::{Rule, ValidationType};
use crate::certificate::HealthCertificate;
use crate::cose::KeyId;
use crate::error::VerifyError;

/// Evaluates rule logic against a data document.
pub trait RuleEvaluator: Send + Sync {
    /// Evaluate `logic` over `data` (`{"payload": facts, "external": params}`).
    fn evaluate(
        &self,
        logic: &serde_json::Value,
        data: &serde_json::Value,
    ) -> Result<bool, VerifyError>;
}

/// Evaluator that only understands boolean literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralEvaluator;

impl RuleEvaluator for LiteralEvaluator {
    fn evaluate(
        &self,
        logic: &serde_json::Value,
        _data: &serde_json::Value,
    ) -> Result<bool, VerifyError> {
        logic.as_bool().ok_or_else(|| VerifyError::RuleEvaluation {
            identifier: String::new(),
            reason: "only boolean literal logic is supported".into(),
        })
    }
}

/// Context values exposed to rule logic next to the payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalParameters {
    /// Time the rules are evaluated at.
    pub validation_clock: DateTime<Utc>,
    /// Verifying country.
    pub country_code: String,
    /// Issuing country.
    pub issuer_country_code: String,
    /// Certificate expiry.
    pub exp: DateTime<Utc>,
    /// Certificate issuance, if known.
    pub iat: Option<DateTime<Utc>>,
    /// Signer key identifier, base64. Empty for certificates whose
    /// signature was not validated.
    pub kid: String,
    /// Verifying region, empty if none.
    pub region: String,
}

impl ExternalParameters {
    /// Parameters for validating `certificate` in `country`/`region` at `at`.
    #[must_use]
    pub fn for_certificate(
        certificate: &HealthCertificate,
        country: &str,
        region: Option<&str>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            validation_clock: at,
            country_code: country.to_string(),
            issuer_country_code: certificate.issuer_country.clone(),
            exp: certificate.expires_at,
            iat: certificate.issued_at,
            kid: certificate
                .signer_kid
                .as_ref()
                .map(KeyId::to_base64)
                .unwrap_or_default(),
            region: region.unwrap_or("").trim().to_string(),
        }
    }
}

/// Outcome of a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleOutcome {
    /// Logic returned true.
    Passed,
    /// Logic returned false.
    Failed,
    /// Logic could not be evaluated.
    Open,
}

/// One rule with its outcome.
#[derive(Debug, Clone)]
pub struct RuleResult {
    /// The evaluated rule.
    pub rule: Arc<Rule>,
    /// Outcome.
    pub outcome: RuleOutcome,
    /// Evaluator message for open rules.
    pub message: Option<String>,
}

/// Evaluates the applicable rules for certificates.
pub struct RulesValidator<'a> {
    repository: &'a dyn RuleRepository,
    evaluator: &'a dyn RuleEvaluator,
    acceptance_country: String,
    region: Option<String>,
}

impl<'a> RulesValidator<'a> {
    /// Create a validator for `acceptance_country`.
    pub fn new(
        repository: &'a dyn RuleRepository,
        evaluator: &'a dyn RuleEvaluator,
        acceptance_country: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            evaluator,
            acceptance_country: acceptance_country.into(),
            region: None,
        }
    }

    /// Restrict region-scoped rules to `region`.
    #[must_use]
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Select and evaluate the rules of `validation_type` for `certificate`.
    pub fn validate(
        &self,
        certificate: &HealthCertificate,
        validation_type: ValidationType,
        at: DateTime<Utc>,
    ) -> Vec<RuleResult> {
        let rules = RuleSelector::new(self.repository).select(
            validation_type,
            &self.acceptance_country,
            &certificate.issuer_country,
            certificate.certificate_type(),
            at,
            self.region.as_deref(),
        );
        let params = ExternalParameters::for_certificate(
            certificate,
            &self.acceptance_country,
            self.region.as_deref(),
            at,
        );
        self.evaluate_rules(&rules, certificate, &params)
    }

    /// Evaluate `rules`. Errors become [`RuleOutcome::Open`] and never abort
    /// the remaining rules.
    pub fn evaluate_rules(
        &self,
        rules: &[Arc<Rule>],
        certificate: &HealthCertificate,
        params: &ExternalParameters,
    ) -> Vec<RuleResult> {
        let data = serde_json::json!({
            "payload": certificate.facts(),
            "external": params,
        });

        rules
            .iter()
            .map(|rule| match self.evaluator.evaluate(&rule.logic, &data) {
                Ok(passed) => {
                    debug!(rule = %rule.identifier, passed, "Evaluated rule");
                    RuleResult {
                        rule: Arc::clone(rule),
                        outcome: if passed { RuleOutcome::Passed } else { RuleOutcome::Failed },
                        message: None,
                    }
                }
                Err(e) => {
                    let reason = match e {
                        VerifyError::RuleEvaluation { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    let error = VerifyError::RuleEvaluation {
                        identifier: rule.identifier.clone(),
                        reason,
                    };
                    warn!(error = %error, "Rule could not be evaluated");
                    RuleResult {
                        rule: Arc::clone(rule),
                        outcome: RuleOutcome::Open,
                        message: Some(error.to_string()),
                    }
                }
            })
            .collect()
    }
}
