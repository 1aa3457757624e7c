//! RSASSA-PSS with SHA-256 (COSE PS256).

use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::RsaPrivateKey;
use rand_core::OsRng;
use sha2::Sha256;

use crate::error::CryptoError;
use crate::public_key::PublicKey;
use crate::types::SignatureAlgorithm;
use crate::verifier::{SignatureVerifier, Signer};

/// PS256 signer with a blinded private key.
pub struct PssSigner {
    private_key: RsaPrivateKey,
}

impl PssSigner {
    /// Generate a fresh key of `bits` modulus length.
    ///
    /// # Errors
    ///
    /// Returns error if key generation fails.
    pub fn random(bits: usize) -> Result<Self, CryptoError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::invalid_private_key(e.to_string()))?;
        Ok(Self { private_key })
    }

    /// Wrap an existing private key.
    #[must_use]
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }
}

impl Signer for PssSigner {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ps256
    }

    fn public_key(&self) -> Result<PublicKey, CryptoError> {
        Ok(PublicKey::Rsa(self.private_key.to_public_key()))
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = BlindedSigningKey::<Sha256>::new(self.private_key.clone());
        let signature = key
            .try_sign_with_rng(&mut OsRng, data)
            .map_err(|e| CryptoError::signing_failed(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

/// PS256 verifier.
#[derive(Default)]
pub struct PssVerifier;

impl PssVerifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for PssVerifier {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ps256
    }

    fn verify(
        &self,
        public_key: &PublicKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool, CryptoError> {
        let PublicKey::Rsa(key) = public_key else {
            return Err(CryptoError::KeyAlgorithmMismatch {
                algorithm: SignatureAlgorithm::Ps256,
            });
        };

        let sig = Signature::try_from(signature)
            .map_err(|e| CryptoError::invalid_signature(e.to_string()))?;
        let vk = VerifyingKey::<Sha256>::new(key.clone());

        Ok(vk.verify(data, &sig).is_ok())
    }
}
