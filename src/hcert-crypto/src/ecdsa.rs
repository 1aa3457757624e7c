//! ECDSA P-256 signature operations (COSE ES256).
//!
//! Signatures are the raw 64-byte `r || s` form COSE mandates, which is the
//! same layout `p256::ecdsa::Signature::to_bytes` produces.

use p256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use p256::pkcs8::DecodePrivateKey;
use rand_core::OsRng;

use crate::error::CryptoError;
use crate::public_key::PublicKey;
use crate::types::SignatureAlgorithm;
use crate::verifier::{SignatureVerifier, Signer};

/// ECDSA P-256 signer.
pub struct P256Signer {
    signing_key: SigningKey,
}

impl P256Signer {
    /// Create a new signer with a random key.
    #[must_use]
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Create a signer from a raw 32-byte scalar.
    ///
    /// # Errors
    ///
    /// Returns error if the key bytes are invalid.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(Self { signing_key })
    }

    /// Create a signer from a PKCS#8 DER private key.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not a P-256 key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;

        Ok(Self { signing_key })
    }

    /// Get the verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl Signer for P256Signer {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Es256
    }

    fn public_key(&self) -> Result<PublicKey, CryptoError> {
        Ok(PublicKey::P256(*self.signing_key.verifying_key()))
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self.signing_key.sign(data);
        Ok(signature.to_bytes().to_vec())
    }
}

/// ECDSA P-256 verifier.
pub struct P256Verifier;

impl P256Verifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for P256Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for P256Verifier {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Es256
    }

    fn verify(
        &self,
        public_key: &PublicKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        let PublicKey::P256(vk) = public_key else {
            return Err(CryptoError::KeyAlgorithmMismatch {
                algorithm: SignatureAlgorithm::Es256,
            });
        };

        let sig = Signature::from_slice(signature)
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;

        Ok(vk.verify(data, &sig).is_ok())
    }
}
