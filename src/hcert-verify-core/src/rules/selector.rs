//! Selection of the rules that apply to one certificate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::repository::RuleRepository;
use super::version::RuleVersion;
use super::{Rule, RuleCertificateType, RuleType, ValidationType};
use crate::certificate::CertificateType;

/// Keep the highest version per identifier, in first-seen order.
///
/// With `region = Some(..)` only rules whose region matches (trimmed,
/// case-insensitive; a missing region is the empty string) are considered.
/// An unparseable version loses to any parseable one and never replaces an
/// earlier rule it ties with.
pub fn latest_by_identifier(rules: Vec<Arc<Rule>>, region: Option<&str>) -> Vec<Arc<Rule>> {
    let mut selected: Vec<Arc<Rule>> = Vec::new();

    for rule in rules {
        if let Some(wanted) = region {
            let rule_region = rule.region.as_deref().unwrap_or("").trim();
            if !rule_region.eq_ignore_ascii_case(wanted.trim()) {
                continue;
            }
        }

        match selected.iter_mut().find(|r| r.identifier == rule.identifier) {
            Some(existing) => {
                if RuleVersion::parse(&rule.version) > RuleVersion::parse(&existing.version) {
                    *existing = rule;
                }
            }
            None => selected.push(rule),
        }
    }

    selected
}

/// Picks the applicable rules for a validation.
pub struct RuleSelector<'a> {
    repository: &'a dyn RuleRepository,
}

impl<'a> RuleSelector<'a> {
    /// Create a selector over `repository`.
    pub fn new(repository: &'a dyn RuleRepository) -> Self {
        Self { repository }
    }

    /// Rules for `validation_type`.
    ///
    /// - `Rules`: acceptance rules of `acceptance_country` in `region`, plus
    ///   invalidation rules of `issuance_country` (any region)
    /// - `Invalidation`: the invalidation rules alone
    /// - status types: rules of that type of `acceptance_country` in `region`
    pub fn select(
        &self,
        validation_type: ValidationType,
        acceptance_country: &str,
        issuance_country: &str,
        certificate_type: CertificateType,
        at: DateTime<Utc>,
        region: Option<&str>,
    ) -> Vec<Arc<Rule>> {
        let cert_type = RuleCertificateType::from(certificate_type);
        let region = region.unwrap_or("");

        let selected = match validation_type {
            ValidationType::Rules => {
                let mut rules = latest_by_identifier(
                    self.repository
                        .get_rules_by(acceptance_country, at, &RuleType::Acceptance, &cert_type),
                    Some(region),
                );
                rules.extend(self.invalidation_rules(issuance_country, at, &cert_type));
                rules
            }
            ValidationType::Invalidation => self.invalidation_rules(issuance_country, at, &cert_type),
            status => match status.status_rule_type() {
                Some(rule_type) => latest_by_identifier(
                    self.repository
                        .get_rules_by(acceptance_country, at, &rule_type, &cert_type),
                    Some(region),
                ),
                None => Vec::new(),
            },
        };

        debug!(
            ?validation_type,
            country = acceptance_country,
            issuer = issuance_country,
            region,
            rules = selected.len(),
            "Selected rules"
        );
        selected
    }

    fn invalidation_rules(
        &self,
        issuance_country: &str,
        at: DateTime<Utc>,
        cert_type: &RuleCertificateType,
    ) -> Vec<Arc<Rule>> {
        if issuance_country.trim().is_empty() {
            return Vec::new();
        }
        latest_by_identifier(
            self.repository
                .get_rules_by(issuance_country, at, &RuleType::Invalidation, cert_type),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::repository::InMemoryRuleRepository;
    use crate::rules::tests::rule_json;

    fn rule(identifier: &str, version: &str, region: Option<&str>) -> Rule {
        let mut rule: Rule = serde_json::from_value(rule_json(identifier, version)).unwrap();
        rule.region = region.map(str::to_string);
        rule
    }

    fn at() -> DateTime<Utc> {
        "2022-01-01T00:00:00Z".parse().unwrap()
    }

    fn ids(rules: &[Arc<Rule>]) -> Vec<(String, String)> {
        rules
            .iter()
            .map(|r| (r.identifier.clone(), r.version.clone()))
            .collect()
    }

    #[test]
    fn test_highest_version_wins() {
        let rules = vec![
            Arc::new(rule("R1", "1.0", None)),
            Arc::new(rule("R1", "1.2", None)),
            Arc::new(rule("R1", "1.1", None)),
        ];
        assert_eq!(
            ids(&latest_by_identifier(rules, Some(""))),
            vec![("R1".to_string(), "1.2".to_string())]
        );
    }

    #[test]
    fn test_malformed_version_loses() {
        let rules = vec![
            Arc::new(rule("R1", "garbage", None)),
            Arc::new(rule("R1", "0.0.1", None)),
            Arc::new(rule("R2", "1.0", None)),
            Arc::new(rule("R2", "oops", None)),
        ];
        assert_eq!(
            ids(&latest_by_identifier(rules, None)),
            vec![
                ("R1".to_string(), "0.0.1".to_string()),
                ("R2".to_string(), "1.0".to_string())
            ]
        );
    }

    #[test]
    fn test_region_match_is_case_insensitive() {
        let rules = vec![
            Arc::new(rule("R1", "1.0", Some(" BY "))),
            Arc::new(rule("R2", "1.0", Some("NW"))),
            Arc::new(rule("R3", "1.0", None)),
        ];
        assert_eq!(ids(&latest_by_identifier(rules.clone(), Some("by"))).len(), 1);
        assert_eq!(ids(&latest_by_identifier(rules, Some(" ")))[0].0, "R3");
    }

    #[test]
    fn test_rules_merge_acceptance_and_invalidation() {
        let mut invalidation = rule("IR-FR-0001", "1.0", Some("somewhere"));
        invalidation.rule_type = RuleType::Invalidation;
        invalidation.country = "FR".into();
        let mut mask = rule("MR-DE-0001", "1.0", None);
        mask.rule_type = RuleType::Mask;

        let repo = InMemoryRuleRepository::with_rules([
            rule("VR-DE-0001", "1.0", None),
            invalidation,
            mask,
        ]);
        let selector = RuleSelector::new(&repo);

        let rules = selector.select(ValidationType::Rules, "DE", "FR", CertificateType::Vaccination, at(), None);
        assert_eq!(ids(&rules).len(), 2);
        assert!(rules.iter().all(|r| r.rule_type != RuleType::Mask));

        let masks = selector.select(ValidationType::Mask, "DE", "FR", CertificateType::Vaccination, at(), None);
        assert_eq!(masks[0].identifier, "MR-DE-0001");

        let none = selector.select(ValidationType::Invalidation, "DE", " ", CertificateType::Vaccination, at(), None);
        assert!(none.is_empty());
    }
}
