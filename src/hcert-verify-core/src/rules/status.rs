//! Mask and immunity status derived from status rules.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::evaluator::{RuleOutcome, RuleResult, RulesValidator};
use super::ValidationType;
use crate::certificate::HealthCertificate;

/// Aggregate of a rule run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidatorResult {
    /// At least one rule ran and all passed.
    Passed,
    /// At least one rule did not pass.
    Failed,
    /// No rule applied.
    NoRules,
}

impl ValidatorResult {
    /// Fold per-rule results.
    #[must_use]
    pub fn from_results(results: &[RuleResult]) -> Self {
        if results.is_empty() {
            Self::NoRules
        } else if results.iter().all(|r| r.outcome == RuleOutcome::Passed) {
            Self::Passed
        } else {
            Self::Failed
        }
    }
}

/// Whether the holder must wear a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MaskStatus {
    /// Mask rules passed.
    NotRequired,
    /// Mask rules failed.
    Required,
    /// No mask rule is published for the region.
    NoRules,
}

/// Immunity status of the holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImmunityStatus {
    /// One of the B2, C2 or E2 stages passed.
    Full,
    /// A certificate exists but no stage passed.
    Partial,
    /// No certificate to assess.
    Invalid,
}

/// Mask status of `certificate`.
pub fn evaluate_mask_status(
    validator: &RulesValidator<'_>,
    certificate: &HealthCertificate,
    at: DateTime<Utc>,
) -> MaskStatus {
    let results = validator.validate(certificate, ValidationType::Mask, at);
    match ValidatorResult::from_results(&results) {
        ValidatorResult::Passed => MaskStatus::NotRequired,
        ValidatorResult::Failed => MaskStatus::Required,
        ValidatorResult::NoRules => MaskStatus::NoRules,
    }
}

/// Immunity status of `certificate`, trying B2, C2 and E2 in turn.
///
/// A stage passes only if it has rules and all of them pass.
pub fn evaluate_immunity_status(
    validator: &RulesValidator<'_>,
    certificate: Option<&HealthCertificate>,
    at: DateTime<Utc>,
) -> ImmunityStatus {
    let Some(certificate) = certificate else {
        return ImmunityStatus::Invalid;
    };

    for stage in [
        ValidationType::ImmunityStatusB2,
        ValidationType::ImmunityStatusC2,
        ValidationType::ImmunityStatusE2,
    ] {
        let results = validator.validate(certificate, stage, at);
        if ValidatorResult::from_results(&results) == ValidatorResult::Passed {
            debug!(?stage, "Immunity stage passed");
            return ImmunityStatus::Full;
        }
    }

    ImmunityStatus::Partial
}
