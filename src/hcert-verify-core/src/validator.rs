//! COSE signature validation against the trust registry.
//!
//! ```text
//! Decoded ──exp < now──────────────────────▶ Expired
//!    │
//!    ├─ candidates = find_by_kid(kid) or all
//!    │     for each: window ∋ now, verify(sig), country == iss, EKU permits type
//!    │
//!    ├─ first candidate passing all checks ─▶ Valid
//!    └─ none ───────────────────────────────▶ BadSignature
//! ```
//!
//! ## Security Properties
//!
//! - **Expiry first**: expired tokens are rejected before any signature work
//! - **Country binding**: a key of country A only validates tokens issued by A
//! - **No variant guessing**: the algorithm comes from the COSE header and the
//!   key family must match it

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hcert_crypto::{verify_signature, SignatureAlgorithm};
use tracing::{debug, instrument, warn};

use crate::certificate::HealthCertificate;
use crate::cose::{KeyId, SignedToken};
use crate::cwt::DecodedClaims;
use crate::error::VerifyError;
use crate::trust::{TrustRegistry, TrustedCertificate};

/// A token whose signature was validated.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    /// CWT claims.
    pub claims: DecodedClaims,
    /// Typed certificate view.
    pub certificate: HealthCertificate,
    /// The DSC that validated the signature.
    pub signer: Arc<TrustedCertificate>,
    /// Key identifier from the token, if present.
    pub kid: Option<KeyId>,
    /// Signature algorithm from the token.
    pub algorithm: SignatureAlgorithm,
    /// Raw signature bytes (input to the signature revocation hash).
    pub signature: Vec<u8>,
}

/// Validates COSE_Sign1 tokens against a [`TrustRegistry`].
pub struct SignatureValidator<'a> {
    registry: &'a TrustRegistry,
    clock_skew: chrono::Duration,
}

impl<'a> SignatureValidator<'a> {
    /// Create a validator over `registry`.
    #[must_use]
    pub fn new(registry: &'a TrustRegistry) -> Self {
        Self {
            registry,
            clock_skew: chrono::Duration::zero(),
        }
    }

    /// Tolerate `skew` when comparing against expiry and DSC validity.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: std::time::Duration) -> Self {
        self.clock_skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
        self
    }

    /// Validate `token` at `now`.
    #[instrument(skip(self, token), fields(kid))]
    pub fn validate(
        &self,
        token: &SignedToken,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, VerifyError> {
        let claims = DecodedClaims::decode(token.payload())?;

        if claims.is_expired(now - self.clock_skew) {
            debug!(exp = %claims.valid_until, "Token expired");
            return Err(VerifyError::Expired {
                expired_at: claims.valid_until.timestamp(),
            });
        }

        let mut certificate = HealthCertificate::from_claims(&claims)?;
        let algorithm = token.algorithm()?;
        let tbs = token.sig_structure()?;
        let kid = token.kid();
        if let Some(kid) = &kid {
            tracing::Span::current().record("kid", tracing::field::display(kid));
        }

        let snapshot = self.registry.snapshot();
        let by_kid = kid.as_ref().map(|k| snapshot.find_by_kid(k)).unwrap_or_default();
        let candidates = if by_kid.is_empty() {
            debug!("No certificate for kid, trying all trusted certificates");
            snapshot.all()
        } else {
            by_kid
        };

        let mut last_reason = String::from("no trusted certificates");
        for candidate in candidates {
            match self.check_candidate(candidate, &claims, &certificate, algorithm, &tbs, token, now) {
                Ok(()) => {
                    debug!(country = %candidate.country, signer_kid = %candidate.kid, "Signature valid");
                    certificate.signer_kid = Some(candidate.kid.clone());
                    return Ok(ValidatedToken {
                        claims,
                        certificate,
                        signer: Arc::clone(candidate),
                        kid,
                        algorithm,
                        signature: token.signature().to_vec(),
                    });
                }
                Err(reason) => last_reason = reason,
            }
        }

        warn!(issuer = %claims.issuer_country, reason = %last_reason, "No trusted certificate validated the signature");
        Err(VerifyError::bad_signature(last_reason))
    }

    #[allow(clippy::too_many_arguments)]
    fn check_candidate(
        &self,
        candidate: &TrustedCertificate,
        claims: &DecodedClaims,
        certificate: &HealthCertificate,
        algorithm: SignatureAlgorithm,
        tbs: &[u8],
        token: &SignedToken,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let window_ok = candidate.is_valid_at(now + self.clock_skew)
            || candidate.is_valid_at(now - self.clock_skew);
        if !window_ok {
            return Err(format!("certificate {} outside its validity window", candidate.kid));
        }

        match verify_signature(algorithm, &candidate.public_key, tbs, token.signature()) {
            Ok(true) => {}
            Ok(false) => return Err("signature mismatch".to_string()),
            Err(e) => return Err(e.to_string()),
        }

        if !candidate.country.eq_ignore_ascii_case(&claims.issuer_country) {
            return Err(format!(
                "signer country {} does not match issuer {}",
                candidate.country, claims.issuer_country
            ));
        }

        if !candidate.permits(certificate.certificate_type()) {
            return Err(format!(
                "certificate {} not authorised for {} certificates",
                candidate.kid,
                certificate.certificate_type()
            ));
        }

        Ok(())
    }
}
