//! Membership lookup against a [`RevocationSource`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::hash::{chunk_matches, RevocationCandidate};
use super::{HashVariant, RevocationOutcome, RevocationSource};
use crate::error::VerifyError;

/// Default timeout for a single source call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Answers "is this certificate revoked?" with the fewest fetches.
#[derive(Clone)]
pub struct RevocationIndex {
    source: Arc<dyn RevocationSource>,
    timeout: Duration,
}

impl RevocationIndex {
    /// Create a lookup over `source`.
    pub fn new(source: Arc<dyn RevocationSource>) -> Self {
        Self {
            source,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound every source call by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Look the candidate up, folding failures into
    /// [`RevocationOutcome::Unavailable`].
    #[instrument(skip(self, candidate), fields(kid = %candidate.kid))]
    pub async fn check(&self, candidate: &RevocationCandidate) -> RevocationOutcome {
        match self.lookup(candidate).await {
            Ok(Some(variant)) => {
                warn!(%variant, "Certificate is revoked");
                RevocationOutcome::Revoked { variant }
            }
            Ok(None) => RevocationOutcome::NotRevoked,
            Err(e) => {
                warn!(error = %e, "Revocation check unavailable");
                RevocationOutcome::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Look the candidate up. `Ok(Some(variant))` names the matching hash
    /// variant; any source failure is `RevocationCheckUnavailable`.
    pub async fn lookup(
        &self,
        candidate: &RevocationCandidate,
    ) -> Result<Option<HashVariant>, VerifyError> {
        let kid_list = self.call(self.source.get_kid_list()).await?;
        let Some(entry) = kid_list.into_iter().find(|e| e.kid == candidate.kid) else {
            debug!("Kid has no revocations");
            return Ok(None);
        };

        for &variant_byte in entry.hash_variants.keys() {
            let Some(variant) = HashVariant::from_byte(variant_byte) else {
                debug!(variant = variant_byte, "Skipping unknown hash variant");
                continue;
            };
            let Some(hash) = candidate.hash(variant) else {
                debug!(%variant, "Hash input unavailable");
                continue;
            };
            let (byte1, byte2) = (hash[0], hash[1]);

            let index = self
                .call(self.source.get_index(&candidate.kid, variant_byte))
                .await?;
            let Some(bucket) = index.get(&byte1) else {
                continue;
            };
            if bucket.byte2.as_ref().is_some_and(|b2| !b2.contains_key(&byte2)) {
                continue;
            }

            let byte_one = self
                .call(self.source.get_byte_one_chunk(&candidate.kid, variant_byte, byte1))
                .await?;
            let byte_two = self
                .call(
                    self.source
                        .get_byte_two_chunk(&candidate.kid, variant_byte, byte1, byte2),
                )
                .await?;

            if byte_two
                .iter()
                .chain(byte_one.iter())
                .any(|chunk| chunk_matches(&hash, chunk))
            {
                return Ok(Some(variant));
            }
        }

        Ok(None)
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, VerifyError>>,
    ) -> Result<T, VerifyError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(VerifyError::revocation_unavailable(e.to_string())),
            Err(_) => Err(VerifyError::revocation_unavailable("revocation source timed out")),
        }
    }
}

impl std::fmt::Debug for RevocationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationIndex")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
