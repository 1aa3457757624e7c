//! Algorithm identifiers.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Signature algorithms accepted for health certificates.
///
/// Discriminants are the COSE algorithm identifiers from the IANA
/// "COSE Algorithms" registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// ECDSA P-256 with SHA-256.
    Es256,
    /// RSASSA-PSS with SHA-256, MGF1 with SHA-256.
    Ps256,
}

impl SignatureAlgorithm {
    /// COSE algorithm identifier (header parameter 1).
    #[must_use]
    pub const fn cose_id(&self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Ps256 => -37,
        }
    }

    /// Map a COSE algorithm identifier onto a supported algorithm.
    pub fn from_cose_id(id: i64) -> Result<Self, CryptoError> {
        match id {
            -7 => Ok(Self::Es256),
            -37 => Ok(Self::Ps256),
            other => Err(CryptoError::UnsupportedAlgorithm {
                algorithm: other.to_string(),
            }),
        }
    }
}
