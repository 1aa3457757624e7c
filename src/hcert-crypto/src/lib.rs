//! # hcert-crypto
//!
//! Signature primitives used to verify digital health certificates.
//!
//! Health certificates are COSE_Sign1 messages signed by a Document Signer
//! Certificate (DSC). Two algorithms are in circulation:
//!
//! - **ES256**: ECDSA over NIST P-256 with SHA-256 (COSE alg `-7`)
//! - **PS256**: RSASSA-PSS with SHA-256 (COSE alg `-37`)
//!
//! ## Signature Encoding
//!
//! COSE carries ECDSA signatures as the fixed-width concatenation `r || s`
//! (64 bytes for P-256), not as DER. RSA signatures are carried verbatim.
//!
//! ```text
//! ES256 signature = r (32 bytes) || s (32 bytes)
//! PS256 signature = RSASSA-PSS output (modulus length)
//! ```
//!
//! The `r` component (or the whole RSA signature) doubles as the input to
//! the signature-based revocation hash; see [`signature_r_value`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod ecdsa;
mod error;
mod public_key;
mod rsa_pss;
mod types;
mod verifier;

pub use ecdsa::{P256Signer, P256Verifier};
pub use error::CryptoError;
pub use public_key::PublicKey;
pub use rsa_pss::{PssSigner, PssVerifier};
pub use types::SignatureAlgorithm;
pub use verifier::{verify_signature, SignatureVerifier, Signer};

/// Constant-time byte comparison.
///
/// Compares two byte slices in constant time to prevent timing attacks.
/// Returns `true` if the slices are equal, `false` otherwise.
///
/// Uses the `subtle` crate's `ConstantTimeEq` trait for the comparison.
/// The length check still returns early, but length is typically not secret.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Extract the part of a COSE signature that identifies it for revocation.
///
/// For ES256 this is the `r` half of `r || s`; for PS256 the complete
/// signature is used. An ES256 signature of odd length has no well-defined
/// `r` and yields `None`.
#[must_use]
pub fn signature_r_value(algorithm: SignatureAlgorithm, signature: &[u8]) -> Option<&[u8]> {
    match algorithm {
        SignatureAlgorithm::Es256 => {
            if signature.is_empty() || signature.len() % 2 != 0 {
                return None;
            }
            Some(&signature[..signature.len() / 2])
        }
        SignatureAlgorithm::Ps256 => Some(signature),
    }
}
