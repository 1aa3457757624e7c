//! Staged refresh of the local revocation mirror.
//!
//! ```text
//! kid list ──▶ index per (kid, variant) ──▶ byte1 chunks ──▶ byte2 chunks
//! ```
//!
//! Each stage commits per key before the next starts. A chunk is only
//! downloaded when the index advertises a `(timestamp, count)` different
//! from the one it was last stored under.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::local::LocalRevocationStore;
use super::RevocationSource;
use crate::cancel::CancellationFlag;
use crate::error::VerifyError;

/// Counters from one refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Kids in the fetched kid list.
    pub kids: usize,
    /// Indexes fetched.
    pub indexes: usize,
    /// Chunks downloaded.
    pub chunks_fetched: usize,
    /// Chunks whose stored copy was still current.
    pub chunks_unchanged: usize,
}

/// Copies a remote [`RevocationSource`] into a [`LocalRevocationStore`].
pub struct RevocationSync<'a> {
    remote: &'a dyn RevocationSource,
    local: &'a LocalRevocationStore,
    timeout: Duration,
    cancel: CancellationFlag,
}

impl<'a> RevocationSync<'a> {
    /// Create a refresh from `remote` into `local`.
    pub fn new(remote: &'a dyn RevocationSource, local: &'a LocalRevocationStore) -> Self {
        Self {
            remote,
            local,
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

    /// Stop between steps once `cancel` is set.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run all stages. On cancellation, keys already committed stay.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncReport, VerifyError> {
        let mut report = SyncReport::default();

        self.cancel.check()?;
        let kid_list = self.call(self.remote.get_kid_list()).await?;
        report.kids = kid_list.len();
        self.local.replace_kid_list(kid_list.clone())?;

        for entry in &kid_list {
            for &variant in entry.hash_variants.keys() {
                self.cancel.check()?;
                let index = self.call(self.remote.get_index(&entry.kid, variant)).await?;
                self.local.replace_index(&entry.kid, variant, index)?;
                report.indexes += 1;
            }
        }

        let indexes = self.local.indexes()?;

        for (kid, variant, index) in &indexes {
            for (&byte1, entry) in index {
                self.cancel.check()?;
                if self.local.byte_one_summary(kid, *variant, byte1) == Some(entry.summary) {
                    report.chunks_unchanged += 1;
                    continue;
                }
                let chunk = self
                    .call(self.remote.get_byte_one_chunk(kid, *variant, byte1))
                    .await?;
                self.local
                    .replace_byte_one(kid, *variant, byte1, entry.summary, chunk)?;
                report.chunks_fetched += 1;
            }
        }

        for (kid, variant, index) in &indexes {
            for (&byte1, entry) in index {
                let Some(byte2s) = &entry.byte2 else {
                    continue;
                };
                for (&byte2, summary) in byte2s {
                    self.cancel.check()?;
                    if self.local.byte_two_summary(kid, *variant, byte1, byte2) == Some(*summary) {
                        report.chunks_unchanged += 1;
                        continue;
                    }
                    let chunk = self
                        .call(self.remote.get_byte_two_chunk(kid, *variant, byte1, byte2))
                        .await?;
                    self.local
                        .replace_byte_two(kid, *variant, byte1, byte2, *summary, chunk)?;
                    report.chunks_fetched += 1;
                }
            }
        }

        info!(
            kids = report.kids,
            indexes = report.indexes,
            fetched = report.chunks_fetched,
            unchanged = report.chunks_unchanged,
            "Revocation mirror refreshed"
        );
        Ok(report)
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, VerifyError>>,
    ) -> Result<T, VerifyError> {
        let result = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| VerifyError::source("revocation source timed out"))?;
        if let Err(e) = &result {
            debug!(error = %e, "Revocation source call failed");
        }
        result
    }
}
