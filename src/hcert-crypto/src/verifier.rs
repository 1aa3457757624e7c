//! Signer/verifier seams and algorithm dispatch.
//!
//! Verification never trusts the algorithm a key "looks like": the COSE
//! header names the algorithm and the key must belong to the same family,
//! otherwise [`CryptoError::KeyAlgorithmMismatch`] is returned.

use crate::ecdsa::P256Verifier;
use crate::error::CryptoError;
use crate::public_key::PublicKey;
use crate::rsa_pss::PssVerifier;
use crate::types::SignatureAlgorithm;

/// Trait for signing operations.
///
/// Production verification never signs; this exists so fixtures and tools
/// can mint certificates with the same primitives that verify them.
pub trait Signer {
    /// Get the algorithm used by this signer.
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Get the matching verification key.
    fn public_key(&self) -> Result<PublicKey, CryptoError>;

    /// Sign data and return the signature in COSE encoding.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Trait for signature verification.
pub trait SignatureVerifier {
    /// Get the algorithm this verifier accepts.
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Verify a signature against a public key.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify,
    /// and `Err` when the inputs cannot be interpreted at all.
    fn verify(&self, public_key: &PublicKey, data: &[u8], signature: &[u8])
        -> Result<bool, CryptoError>;
}

/// Verify `signature` over `data` with the verifier for `algorithm`.
///
/// # Errors
///
/// Returns [`CryptoError::KeyAlgorithmMismatch`] if `public_key` belongs to
/// another family, or a parse error if the signature is malformed.
pub fn verify_signature(
    algorithm: SignatureAlgorithm,
    public_key: &PublicKey,
    data: &[u8],
    signature: &[u8],
) -> Result<bool, CryptoError> {
    if public_key.algorithm() != algorithm {
        return Err(CryptoError::KeyAlgorithmMismatch { algorithm });
    }

    match algorithm {
        SignatureAlgorithm::Es256 => P256Verifier::new().verify(public_key, data, signature),
        SignatureAlgorithm::Ps256 => PssVerifier::new().verify(public_key, data, signature),
    }
}
