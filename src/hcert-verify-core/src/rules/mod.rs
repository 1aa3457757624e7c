//! Business rules: storage, selection, synchronisation and evaluation.
//!
//! Rules are the EU DCC business-rule documents: versioned, time-scoped
//! predicates published per country (and optionally region) that decide
//! whether a certificate is accepted, invalidated, or grants an auxiliary
//! status such as immunity or a mask exemption.

mod evaluator;
mod repository;
mod selector;
mod status;
mod sync;
mod version;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::certificate::CertificateType;

pub use evaluator::{
    ExternalParameters, LiteralEvaluator, RuleEvaluator, RuleOutcome, RuleResult, RulesValidator,
};
pub use repository::{InMemoryRuleRepository, RuleRepository};
pub use selector::{latest_by_identifier, RuleSelector};
pub use status::{evaluate_immunity_status, evaluate_mask_status, ImmunityStatus, MaskStatus, ValidatorResult};
pub use sync::{RuleSource, RuleSync, RuleSyncReport};
pub use version::{compare_versions, RuleVersion};

/// What a rule decides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    /// Acceptance by the verifying country.
    Acceptance,
    /// Invalidation by the issuing country.
    Invalidation,
    /// Immunity status, stage B2.
    ImmunityStatusB2,
    /// Immunity status, stage C2.
    ImmunityStatusC2,
    /// Immunity status, stage E2.
    ImmunityStatusE2,
    /// Mask requirement.
    Mask,
    /// Any other wire value, kept verbatim.
    Unrecognized(String),
}

impl RuleType {
    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Acceptance => "Acceptance",
            Self::Invalidation => "Invalidation",
            Self::ImmunityStatusB2 => "ImpfstatusBZwei",
            Self::ImmunityStatusC2 => "ImpfstatusCZwei",
            Self::ImmunityStatusE2 => "ImpfstatusEZwei",
            Self::Mask => "Mask",
            Self::Unrecognized(other) => other,
        }
    }
}

impl From<String> for RuleType {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "ACCEPTANCE" => Self::Acceptance,
            "INVALIDATION" => Self::Invalidation,
            "IMPFSTATUSBZWEI" => Self::ImmunityStatusB2,
            "IMPFSTATUSCZWEI" => Self::ImmunityStatusC2,
            "IMPFSTATUSEZWEI" => Self::ImmunityStatusE2,
            "MASK" => Self::Mask,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<RuleType> for String {
    fn from(value: RuleType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate type a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleCertificateType {
    /// Every certificate type.
    General,
    /// Vaccination certificates.
    Vaccination,
    /// Test certificates.
    Test,
    /// Recovery certificates.
    Recovery,
    /// Any other wire value, kept verbatim.
    Unrecognized(String),
}

impl RuleCertificateType {
    /// Whether a rule of this type applies to a `requested` certificate type.
    #[must_use]
    pub fn applies_to(&self, requested: &Self) -> bool {
        *self == Self::General || self == requested
    }
}

impl From<String> for RuleCertificateType {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "GENERAL" => Self::General,
            "VACCINATION" => Self::Vaccination,
            "TEST" => Self::Test,
            "RECOVERY" => Self::Recovery,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<RuleCertificateType> for String {
    fn from(value: RuleCertificateType) -> Self {
        match value {
            RuleCertificateType::General => "General".into(),
            RuleCertificateType::Vaccination => "Vaccination".into(),
            RuleCertificateType::Test => "Test".into(),
            RuleCertificateType::Recovery => "Recovery".into(),
            RuleCertificateType::Unrecognized(other) => other,
        }
    }
}

impl From<CertificateType> for RuleCertificateType {
    fn from(value: CertificateType) -> Self {
        match value {
            CertificateType::Vaccination => Self::Vaccination,
            CertificateType::Test => Self::Test,
            CertificateType::Recovery => Self::Recovery,
        }
    }
}

/// Which rule query a validation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationType {
    /// Acceptance rules of the verifying country plus invalidation rules of
    /// the issuing country.
    Rules,
    /// Invalidation rules of the issuing country only.
    Invalidation,
    /// Immunity status B2 rules.
    ImmunityStatusB2,
    /// Immunity status C2 rules.
    ImmunityStatusC2,
    /// Immunity status E2 rules.
    ImmunityStatusE2,
    /// Mask rules.
    Mask,
}

impl ValidationType {
    /// The single rule type queried by status validations.
    #[must_use]
    pub fn status_rule_type(self) -> Option<RuleType> {
        match self {
            Self::ImmunityStatusB2 => Some(RuleType::ImmunityStatusB2),
            Self::ImmunityStatusC2 => Some(RuleType::ImmunityStatusC2),
            Self::ImmunityStatusE2 => Some(RuleType::ImmunityStatusE2),
            Self::Mask => Some(RuleType::Mask),
            Self::Rules | Self::Invalidation => None,
        }
    }
}

/// Localised rule description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// Language code.
    pub lang: String,
    /// Text.
    pub desc: String,
}

/// A business rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rule {
    /// Stable identifier, e.g. `VR-DE-0001`.
    pub identifier: String,
    /// What the rule decides.
    #[serde(rename = "Type")]
    pub rule_type: RuleType,
    /// Dot-separated version.
    pub version: String,
    /// Payload schema version the rule targets.
    #[serde(default)]
    pub schema_version: String,
    /// Logic engine name.
    #[serde(default)]
    pub engine: String,
    /// Logic engine version.
    #[serde(default)]
    pub engine_version: String,
    /// Certificate type the rule applies to.
    pub certificate_type: RuleCertificateType,
    /// Localised descriptions.
    #[serde(rename = "Description", default)]
    pub descriptions: Vec<Description>,
    /// Start of validity (inclusive).
    pub valid_from: DateTime<Utc>,
    /// End of validity (exclusive).
    pub valid_to: DateTime<Utc>,
    /// Payload fields the logic reads.
    #[serde(default)]
    pub affected_fields: Vec<String>,
    /// Rule logic, opaque to this crate.
    pub logic: serde_json::Value,
    /// Publishing country.
    pub country: String,
    /// Region within the country, if any.
    #[serde(default)]
    pub region: Option<String>,
}

impl Rule {
    /// Description in `lang`, falling back to English.
    #[must_use]
    pub fn description_for(&self, lang: &str) -> &str {
        let find = |l: &str| {
            self.descriptions
                .iter()
                .find(|d| d.lang.eq_ignore_ascii_case(l) && !d.desc.trim().is_empty())
                .map(|d| d.desc.as_str())
        };
        find(lang).or_else(|| find("en")).unwrap_or("")
    }

    /// Whether `at` falls within `[valid_from, valid_to)`.
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at < self.valid_to
    }
}

/// Remote listing entry used to diff rule sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleIdentifier {
    /// Rule identifier.
    pub identifier: String,
    /// Rule version.
    pub version: String,
    /// Publishing country.
    pub country: String,
    /// Content hash of the rule body.
    pub hash: String,
}

impl RuleIdentifier {
    /// Listing entry for a rule held locally (no published hash).
    #[must_use]
    pub fn for_rule(rule: &Rule) -> Self {
        Self {
            identifier: rule.identifier.clone(),
            version: rule.version.clone(),
            country: rule.country.clone(),
            hash: String::new(),
        }
    }
}
