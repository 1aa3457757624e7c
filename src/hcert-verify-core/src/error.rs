//! Error types for verification operations.

use thiserror::Error;

/// Errors that can occur during verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Base45 text could not be decoded.
    #[error("Base45 decode error: {reason}")]
    Base45Decode {
        /// Reason the text is invalid.
        reason: String,
    },

    /// Malformed DEFLATE, CBOR, COSE or CWT framing.
    #[error("Decode error: {reason}")]
    Decode {
        /// Reason the token is malformed.
        reason: String,
    },

    /// The certificate's own validity window has passed.
    #[error("Certificate expired at {expired_at}")]
    Expired {
        /// Expiration timestamp (seconds since epoch).
        expired_at: i64,
    },

    /// No trusted certificate validated the signature.
    #[error("Bad signature: {reason}")]
    BadSignature {
        /// Why the last candidate was rejected.
        reason: String,
    },

    /// The revocation index could not be queried.
    #[error("Revocation check unavailable: {reason}")]
    RevocationCheckUnavailable {
        /// Underlying source or storage failure.
        reason: String,
    },

    /// A rule's logic could not be evaluated.
    #[error("Rule evaluation error in {identifier}: {reason}")]
    RuleEvaluation {
        /// Identifier of the offending rule.
        identifier: String,
        /// Evaluator message.
        reason: String,
    },

    /// Trust list document is malformed.
    #[error("Trust list error: {message}")]
    TrustList {
        /// Error message.
        message: String,
    },

    /// A collaborator (trust list, rule or revocation source) failed.
    #[error("Source error: {message}")]
    Source {
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Refresh was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] hcert_crypto::CryptoError),
}

impl VerifyError {
    /// Create a Base45 decode error.
    #[must_use]
    pub fn base45(reason: impl Into<String>) -> Self {
        Self::Base45Decode {
            reason: reason.into(),
        }
    }

    /// Create a framing decode error.
    #[must_use]
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create a bad signature error.
    #[must_use]
    pub fn bad_signature(reason: impl Into<String>) -> Self {
        Self::BadSignature {
            reason: reason.into(),
        }
    }

    /// Create a revocation-unavailable error.
    #[must_use]
    pub fn revocation_unavailable(reason: impl Into<String>) -> Self {
        Self::RevocationCheckUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a collaborator failure.
    #[must_use]
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Create a trust list error.
    #[must_use]
    pub fn trust_list(message: impl Into<String>) -> Self {
        Self::TrustList {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error aborts a single verification attempt.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Base45Decode { .. }
                | Self::Decode { .. }
                | Self::Expired { .. }
                | Self::BadSignature { .. }
                | Self::Crypto(_)
        )
    }

    /// Check if a caller may refresh the trust list and retry once.
    #[must_use]
    pub fn may_refresh_trust_list(&self) -> bool {
        matches!(self, Self::BadSignature { .. })
    }

    /// Check if this error reflects an outage rather than a verdict.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::RevocationCheckUnavailable { .. } | Self::Source { .. } | Self::Cancelled
        )
    }
}
