//! Rule list refresh against a counting rule source.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hcert_verify_core::{
    CancellationFlag, InMemoryRuleRepository, Rule, RuleIdentifier, RuleRepository, RuleSource,
    RuleSync, VerifyError,
};

use crate::support::rule;

struct CountingSource {
    listing: Vec<RuleIdentifier>,
    bodies: HashMap<String, Rule>,
    downloads: AtomicUsize,
}

impl CountingSource {
    fn new(published: &[(&str, &str, &str)], missing: &[&str]) -> Self {
        let listing = published
            .iter()
            .map(|(id, version, hash)| RuleIdentifier {
                identifier: (*id).to_string(),
                version: (*version).to_string(),
                country: "DE".into(),
                hash: (*hash).to_string(),
            })
            .collect();
        let bodies = published
            .iter()
            .filter(|(id, _, _)| !missing.contains(id))
            .map(|(id, version, _)| ((*id).to_string(), rule(id, version, true)))
            .collect();
        Self {
            listing,
            bodies,
            downloads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RuleSource for CountingSource {
    async fn get_rule_identifiers(&self) -> Result<Vec<RuleIdentifier>, VerifyError> {
        Ok(self.listing.clone())
    }

    async fn get_rule(&self, identifier: &RuleIdentifier) -> Result<Rule, VerifyError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(&identifier.identifier)
            .cloned()
            .ok_or_else(|| VerifyError::source(format!("{} not found", identifier.identifier)))
    }
}

fn seeded_repository() -> InMemoryRuleRepository {
    let repository = InMemoryRuleRepository::new();
    let add = [("R1", "h1"), ("R2", "h2"), ("R3", "h3")]
        .into_iter()
        .map(|(id, hash)| {
            let rule = rule(id, "1.0.0", true);
            let identifier = RuleIdentifier {
                hash: hash.to_string(),
                ..RuleIdentifier::for_rule(&rule)
            };
            (identifier, rule)
        })
        .collect();
    repository.replace_rules(&HashSet::new(), add).unwrap();
    repository
}

fn stored(repository: &InMemoryRuleRepository) -> Vec<(String, String)> {
    let mut ids: Vec<_> = repository
        .identifiers()
        .into_iter()
        .map(|id| (id.identifier, id.hash))
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_only_changed_rules_downloaded() {
    let repository = seeded_repository();
    let source = CountingSource::new(
        &[
            ("R1", "1.0.0", "h1"),
            ("R2", "1.1.0", "h2-new"),
            ("R4", "1.0.0", "h4"),
            ("R5", "1.0.0", "h5"),
        ],
        &["R5"],
    );

    let report = RuleSync::new(&source, &repository).run().await.unwrap();
    assert_eq!(report.kept, 1);
    assert_eq!(report.updated, 2);
    assert_eq!(report.removed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(source.downloads.load(Ordering::SeqCst), 3);

    assert_eq!(
        stored(&repository),
        vec![
            ("R1".to_string(), "h1".to_string()),
            ("R2".to_string(), "h2-new".to_string()),
            ("R4".to_string(), "h4".to_string()),
        ]
    );

    // The failed rule is retried next time; the rest is up to date
    let again = RuleSync::new(&source, &repository).run().await.unwrap();
    assert_eq!(again.kept, 3);
    assert_eq!(again.updated, 0);
    assert_eq!(source.downloads.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_cancelled_refresh_leaves_rules() {
    let repository = seeded_repository();
    let source = CountingSource::new(&[("R9", "1.0.0", "h9")], &[]);
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let err = RuleSync::new(&source, &repository)
        .with_cancellation(cancel)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Cancelled));
    assert_eq!(repository.len(), 3);
}

struct FailingListing;

#[async_trait]
impl RuleSource for FailingListing {
    async fn get_rule_identifiers(&self) -> Result<Vec<RuleIdentifier>, VerifyError> {
        Err(VerifyError::source("listing unavailable"))
    }

    async fn get_rule(&self, _identifier: &RuleIdentifier) -> Result<Rule, VerifyError> {
        unreachable!("no listing, no downloads")
    }
}

#[tokio::test]
async fn test_failed_listing_changes_nothing() {
    let repository = seeded_repository();
    let err = RuleSync::new(&FailingListing, &repository).run().await.unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(repository.len(), 3);
}
