//! Rule storage with transactional replacement.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Rule, RuleCertificateType, RuleIdentifier, RuleType};
use crate::error::VerifyError;
use crate::snapshot::Snapshot;

/// Store of rules.
///
/// Implementations must apply `replace_rules` atomically: a concurrent
/// `get_rules_by` sees the set before or after it, never in between.
pub trait RuleRepository: Send + Sync {
    /// Delete every rule whose identifier is not in `keep`, then insert
    /// `add` (replacing same-identifier rules).
    fn replace_rules(
        &self,
        keep: &HashSet<String>,
        add: Vec<(RuleIdentifier, Rule)>,
    ) -> Result<(), VerifyError>;

    /// Rules of `country` valid at `at`, of exactly `rule_type`, whose
    /// certificate type is `certificate_type` or general.
    fn get_rules_by(
        &self,
        country: &str,
        at: DateTime<Utc>,
        rule_type: &RuleType,
        certificate_type: &RuleCertificateType,
    ) -> Vec<Arc<Rule>>;

    /// Listing entries of every stored rule.
    fn identifiers(&self) -> Vec<RuleIdentifier>;
}

#[derive(Debug, Default)]
struct RuleSet {
    entries: Vec<(RuleIdentifier, Arc<Rule>)>,
}

/// [`RuleRepository`] held in memory behind a copy-then-swap snapshot.
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    rules: Snapshot<RuleSet>,
    writer: Mutex<()>,
}

impl InMemoryRuleRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding `rules`.
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let entries = rules
            .into_iter()
            .map(|rule| (RuleIdentifier::for_rule(&rule), Arc::new(rule)))
            .collect();
        Self {
            rules: Snapshot::new(RuleSet { entries }),
            writer: Mutex::new(()),
        }
    }

    /// Number of stored rules.
    pub fn len(&self) -> usize {
        self.rules.load().entries.len()
    }

    /// Whether no rule is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn replace_rules(
        &self,
        keep: &HashSet<String>,
        add: Vec<(RuleIdentifier, Rule)>,
    ) -> Result<(), VerifyError> {
        // Writers serialize so no replacement is built from a stale generation
        let _guard = self
            .writer
            .lock()
            .map_err(|_| VerifyError::source("rule repository writer lock poisoned"))?;
        let current = self.rules.load();
        let added: HashSet<&str> = add.iter().map(|(id, _)| id.identifier.as_str()).collect();

        let mut entries: Vec<(RuleIdentifier, Arc<Rule>)> = current
            .entries
            .iter()
            .filter(|(id, _)| keep.contains(&id.identifier) && !added.contains(id.identifier.as_str()))
            .cloned()
            .collect();
        let kept = entries.len();
        entries.extend(add.into_iter().map(|(id, rule)| (id, Arc::new(rule))));

        debug!(kept, added = entries.len() - kept, "Replacing rule set");
        self.rules.store(RuleSet { entries });
        Ok(())
    }

    fn get_rules_by(
        &self,
        country: &str,
        at: DateTime<Utc>,
        rule_type: &RuleType,
        certificate_type: &RuleCertificateType,
    ) -> Vec<Arc<Rule>> {
        self.rules
            .load()
            .entries
            .iter()
            .map(|(_, rule)| rule)
            .filter(|rule| {
                rule.country.eq_ignore_ascii_case(country)
                    && rule.is_valid_at(at)
                    && rule.rule_type == *rule_type
                    && rule.certificate_type.applies_to(certificate_type)
            })
            .cloned()
            .collect()
    }

    fn identifiers(&self) -> Vec<RuleIdentifier> {
        self.rules
            .load()
            .entries
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}
