//! Rule list synchronisation.
//!
//! Remote identifiers are diffed against the local ones by content hash.
//! Only added or changed bodies are downloaded, and everything is written
//! with one `replace_rules` call after all downloads finished.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::repository::RuleRepository;
use super::{Rule, RuleIdentifier};
use crate::cancel::CancellationFlag;
use crate::error::VerifyError;

/// Remote publisher of business rules.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Listing of every published rule.
    async fn get_rule_identifiers(&self) -> Result<Vec<RuleIdentifier>, VerifyError>;

    /// Body of one rule.
    async fn get_rule(&self, identifier: &RuleIdentifier) -> Result<Rule, VerifyError>;
}

/// Counters from one rule refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleSyncReport {
    /// Rules kept unchanged.
    pub kept: usize,
    /// New or changed rules stored.
    pub updated: usize,
    /// Local rules no longer published.
    pub removed: usize,
    /// Body downloads that failed.
    pub failed: usize,
}

/// Brings a [`RuleRepository`] in line with a [`RuleSource`].
pub struct RuleSync<'a> {
    remote: &'a dyn RuleSource,
    repository: &'a dyn RuleRepository,
    timeout: Duration,
    cancel: CancellationFlag,
}

impl<'a> RuleSync<'a> {
    /// Create a refresh from `remote` into `repository`.
    pub fn new(remote: &'a dyn RuleSource, repository: &'a dyn RuleRepository) -> Self {
        Self {
            remote,
            repository,
            timeout: Duration::from_secs(30),
            cancel: CancellationFlag::new(),
        }
    }

    /// Bound every remote call by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort before writing once `cancel` is set.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the refresh. Nothing is written if the listing fails or the
    /// refresh is cancelled.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RuleSyncReport, VerifyError> {
        self.cancel.check()?;

        let remote_ids = tokio::time::timeout(self.timeout, self.remote.get_rule_identifiers())
            .await
            .map_err(|_| VerifyError::source("rule listing timed out"))??;
        let remote: HashMap<String, RuleIdentifier> = remote_ids
            .into_iter()
            .map(|id| (id.identifier.clone(), id))
            .collect();
        let local: HashMap<String, RuleIdentifier> = self
            .repository
            .identifiers()
            .into_iter()
            .map(|id| (id.identifier.clone(), id))
            .collect();

        let keep: HashSet<String> = local
            .iter()
            .filter(|(name, id)| remote.get(*name).is_some_and(|r| r.hash == id.hash))
            .map(|(name, _)| name.clone())
            .collect();
        let to_fetch: Vec<&RuleIdentifier> = remote
            .values()
            .filter(|id| !keep.contains(&id.identifier))
            .collect();
        let removed = local.keys().filter(|name| !remote.contains_key(*name)).count();

        let fetched = join_all(to_fetch.iter().map(|id| async move {
            let result = tokio::time::timeout(self.timeout, self.remote.get_rule(id))
                .await
                .map_err(|_| VerifyError::source("rule download timed out"))
                .and_then(|r| r);
            (*id, result)
        }))
        .await;

        let mut add = Vec::new();
        let mut failed = 0;
        for (id, result) in fetched {
            match result {
                Ok(rule) => add.push((id.clone(), rule)),
                Err(e) => {
                    warn!(rule = %id.identifier, error = %e, "Rule download failed");
                    failed += 1;
                }
            }
        }

        self.cancel.check()?;

        let report = RuleSyncReport {
            kept: keep.len(),
            updated: add.len(),
            removed,
            failed,
        };
        self.repository.replace_rules(&keep, add)?;

        info!(
            kept = report.kept,
            updated = report.updated,
            removed = report.removed,
            failed = report.failed,
            "Rules refreshed"
        );
        Ok(report)
    }
}
