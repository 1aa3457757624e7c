//! Revocation hash derivation and chunk matching.

use hcert_crypto::{constant_time_eq, signature_r_value, SignatureAlgorithm};
use sha2::{Digest, Sha256};

use super::HashVariant;
use crate::cose::KeyId;
use crate::validator::ValidatedToken;

/// Length of a revocation hash.
pub const HASH_LEN: usize = 16;
/// Bytes of the hash consumed by the byte1/byte2 partitioning.
pub const PREFIX_LEN: usize = 2;

/// The certificate fields the revocation hashes are computed over.
#[derive(Debug, Clone)]
pub struct RevocationCandidate {
    /// Key identifier the certificate was signed under.
    pub kid: KeyId,
    /// Unique certificate identifier.
    pub uci: String,
    /// Issuing country.
    pub issuer_country: String,
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Raw COSE signature.
    pub signature: Vec<u8>,
}

impl RevocationCandidate {
    /// Candidate for a validated token. Falls back to the signer's kid when
    /// the token carries none.
    #[must_use]
    pub fn from_validated(token: &ValidatedToken) -> Self {
        Self {
            kid: token.kid.clone().unwrap_or_else(|| token.signer.kid.clone()),
            uci: token.certificate.uci().to_string(),
            issuer_country: token.claims.issuer_country.clone(),
            algorithm: token.algorithm,
            signature: token.signature.clone(),
        }
    }

    /// Truncated hash for `variant`, or `None` if the input is unavailable.
    #[must_use]
    pub fn hash(&self, variant: HashVariant) -> Option<[u8; HASH_LEN]> {
        let digest = match variant {
            HashVariant::Signature => {
                Sha256::digest(signature_r_value(self.algorithm, &self.signature)?)
            }
            HashVariant::Uci => Sha256::digest(self.uci.as_bytes()),
            HashVariant::CountryUci => {
                let mut hasher = Sha256::new();
                hasher.update(self.uci.as_bytes());
                hasher.update(self.issuer_country.as_bytes());
                hasher.finalize()
            }
        };
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest[..HASH_LEN]);
        Some(out)
    }
}

/// Whether a chunk entry designates `hash`.
///
/// Publishers either list the full truncated hash or only the part beyond
/// the partition prefix.
#[must_use]
pub fn chunk_matches(hash: &[u8; HASH_LEN], entry: &[u8]) -> bool {
    match entry.len() {
        HASH_LEN => constant_time_eq(entry, hash),
        n if n == HASH_LEN - PREFIX_LEN => constant_time_eq(entry, &hash[PREFIX_LEN..]),
        _ => false,
    }
}
