//! Hierarchical revocation index.
//!
//! The revocation set is partitioned so a verifier only ever downloads the
//! buckets a candidate hash could fall into:
//!
//! ```text
//! kid list ── kid ──▶ { hash variant: count }
//!   index ── (kid, variant) ──▶ { byte1: (ts, n, { byte2: (ts, n) }) }
//!   chunk ── (kid, variant, byte1)        ──▶ [partial hash]
//!   chunk ── (kid, variant, byte1, byte2) ──▶ [partial hash]
//! ```
//!
//! ## Security Properties
//!
//! - **Variant-scoped comparison**: a hash is only compared against buckets
//!   published for its own variant
//! - **Unavailability is not absence**: a failed lookup yields
//!   [`RevocationOutcome::Unavailable`], never `NotRevoked`
//! - **Per-key transactions**: the local mirror replaces one bucket at a
//!   time and removes children of deleted parents in the same write

mod hash;
mod index;
mod local;
mod sync;
mod wire;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cose::KeyId;
use crate::error::VerifyError;

pub use hash::{chunk_matches, RevocationCandidate, HASH_LEN, PREFIX_LEN};
pub use index::RevocationIndex;
pub use local::LocalRevocationStore;
pub use sync::{RevocationSync, SyncReport};
pub use wire::{SignedListFetcher, SignedListSource};

/// How the revocation hash is derived from the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HashVariant {
    /// SHA-256 over the signature r-value.
    Signature,
    /// SHA-256 over the UCI.
    Uci,
    /// SHA-256 over the UCI followed by the issuer country.
    CountryUci,
}

impl HashVariant {
    /// Wire byte of the variant.
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Self::Signature => 0x0a,
            Self::Uci => 0x0b,
            Self::CountryUci => 0x0c,
        }
    }

    /// Map a wire byte; unknown bytes yield `None`.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x0a => Some(Self::Signature),
            0x0b => Some(Self::Uci),
            0x0c => Some(Self::CountryUci),
            _ => None,
        }
    }
}

impl fmt::Display for HashVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Signature => "signature",
            Self::Uci => "uci",
            Self::CountryUci => "country-uci",
        })
    }
}

/// What to do when the revocation index cannot be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RevocationPolicy {
    /// Report the verification as incomplete.
    FailOpen,
    /// Treat the certificate as invalid.
    #[default]
    FailClosed,
}

/// Result of a revocation lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RevocationOutcome {
    /// No consulted bucket contains the certificate.
    NotRevoked,
    /// The certificate's hash was found.
    Revoked {
        /// Variant whose hash matched.
        variant: HashVariant,
    },
    /// The index could not be queried.
    Unavailable {
        /// Underlying failure.
        reason: String,
    },
}

impl RevocationOutcome {
    /// Whether the certificate is known to be revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked { .. })
    }
}

/// Kid-level entry: which hash variants carry revocations for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KidEntry {
    /// Key identifier.
    pub kid: KeyId,
    /// Wire variant byte → number of revoked hashes.
    pub hash_variants: BTreeMap<u8, u32>,
}

/// `(timestamp, count)` summary of one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkSummary {
    /// Last modification, seconds since epoch.
    pub timestamp: Option<i64>,
    /// Number of entries.
    pub count: Option<u32>,
}

/// Index entry for one `byte1` bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntry {
    /// Summary of the byte1 chunk.
    pub summary: ChunkSummary,
    /// Nested byte2 buckets, when the publisher partitions further.
    pub byte2: Option<BTreeMap<u8, ChunkSummary>>,
}

/// Index of a `(kid, variant)` pair keyed by `byte1`.
pub type RevocationIndexMap = BTreeMap<u8, IndexEntry>;

/// A chunk: list of partial hashes.
pub type Chunk = Vec<Vec<u8>>;

/// Remote or local provider of the revocation levels.
///
/// Missing data is an empty result; only transport or storage failures are
/// errors.
#[async_trait]
pub trait RevocationSource: Send + Sync {
    /// Level 0: every kid with revocations.
    async fn get_kid_list(&self) -> Result<Vec<KidEntry>, VerifyError>;

    /// Level 1: the index of `(kid, variant)`.
    async fn get_index(&self, kid: &KeyId, variant: u8) -> Result<RevocationIndexMap, VerifyError>;

    /// Level 2: the byte1 chunk.
    async fn get_byte_one_chunk(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
    ) -> Result<Chunk, VerifyError>;

    /// Level 2: the byte2 chunk.
    async fn get_byte_two_chunk(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
        byte2: u8,
    ) -> Result<Chunk, VerifyError>;
}
