//! Public keys extracted from Document Signer Certificates.

use p256::ecdsa::VerifyingKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;

use crate::error::CryptoError;
use crate::types::SignatureAlgorithm;

/// A verification key of one of the supported families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// NIST P-256 key, used with ES256.
    P256(VerifyingKey),
    /// RSA key, used with PS256.
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Parse a DER-encoded `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the structure is neither
    /// a P-256 nor an RSA key.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
            let point = key.to_encoded_point(false);
            let vk = VerifyingKey::from_sec1_bytes(point.as_bytes())
                .map_err(|e| CryptoError::invalid_public_key(e.to_string()))?;
            return Ok(Self::P256(vk));
        }

        RsaPublicKey::from_public_key_der(der)
            .map(Self::Rsa)
            .map_err(|e| CryptoError::invalid_public_key(format!("unsupported SPKI: {e}")))
    }

    /// Parse an uncompressed or compressed SEC1 P-256 point.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid curve point.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self::P256)
            .map_err(|e| CryptoError::invalid_public_key(e.to_string()))
    }

    /// The only algorithm this key can verify.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::P256(_) => SignatureAlgorithm::Es256,
            Self::Rsa(_) => SignatureAlgorithm::Ps256,
        }
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(vk: VerifyingKey) -> Self {
        Self::P256(vk)
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        Self::Rsa(key)
    }
}
