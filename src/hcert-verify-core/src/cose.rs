//! COSE_Sign1 parsing and Sig_structure encoding (RFC 9052).
//!
//! ```text
//! COSE_Sign1 = [ protected : bstr,
//!               unprotected : map,
//!               payload : bstr / null,
//!               signature : bstr ]
//! ```
//!
//! Health certificates always embed the payload; a detached (`null`)
//! payload is rejected.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hcert_crypto::{SignatureAlgorithm, Signer};
use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};

use crate::cbor::CborValue;
use crate::error::VerifyError;

/// CBOR tag for COSE_Sign1.
pub const COSE_SIGN1_TAG: u64 = 18;

const HEADER_ALG: i64 = 1;
const HEADER_KID: i64 = 4;
const SIG_STRUCTURE_CONTEXT: &str = "Signature1";

/// Length key identifiers are truncated to.
pub const KID_LEN: usize = 8;

/// Key identifier of a Document Signer Certificate.
///
/// Conventionally the first 8 bytes of the SHA-256 of the DER certificate.
/// Longer values are truncated on construction.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(Vec<u8>);

impl KeyId {
    /// Build a key identifier, keeping at most the first 8 bytes.
    #[must_use]
    pub fn new(bytes: &[u8]) -> Self {
        Self(bytes[..bytes.len().min(KID_LEN)].to_vec())
    }

    /// Decode a standard-base64 key identifier.
    pub fn from_base64(text: &str) -> Result<Self, VerifyError> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| VerifyError::decode(format!("invalid kid {text:?}: {e}")))?;
        Ok(Self::new(&bytes))
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Standard-base64 form, as used by trust and revocation lists.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode(&self.0))
    }
}

/// A parsed COSE_Sign1 message.
#[derive(Debug, Clone)]
pub struct SignedToken {
    protected_bytes: Vec<u8>,
    protected: CborValue,
    unprotected: CborValue,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl SignedToken {
    /// Parse a COSE_Sign1 structure from its CBOR encoding.
    ///
    /// Accepts an optional tag 18 and rejects any other tag, arrays that are
    /// not exactly 4 items long, indefinite-length items and trailing bytes.
    pub fn parse(input: &[u8]) -> Result<Self, VerifyError> {
        parse_sign1(input).map_err(VerifyError::decode)
    }

    /// Key identifier from the protected header, falling back to the
    /// unprotected header.
    #[must_use]
    pub fn kid(&self) -> Option<KeyId> {
        self.protected_kid().or_else(|| self.unprotected_kid())
    }

    /// Key identifier carried in the protected header.
    #[must_use]
    pub fn protected_kid(&self) -> Option<KeyId> {
        self.protected
            .get_int(HEADER_KID)
            .and_then(CborValue::as_bytes)
            .map(KeyId::new)
    }

    /// Key identifier carried in the unprotected header.
    #[must_use]
    pub fn unprotected_kid(&self) -> Option<KeyId> {
        self.unprotected
            .get_int(HEADER_KID)
            .and_then(CborValue::as_bytes)
            .map(KeyId::new)
    }

    /// Signature algorithm, protected header first.
    pub fn algorithm(&self) -> Result<SignatureAlgorithm, VerifyError> {
        let id = self
            .protected
            .get_int(HEADER_ALG)
            .or_else(|| self.unprotected.get_int(HEADER_ALG))
            .and_then(CborValue::as_i64)
            .ok_or_else(|| VerifyError::decode("missing algorithm header"))?;
        Ok(SignatureAlgorithm::from_cose_id(id)?)
    }

    /// The signed payload (CWT bytes).
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The bytes the signature is computed over.
    pub fn sig_structure(&self) -> Result<Vec<u8>, VerifyError> {
        encode_sig_structure(&self.protected_bytes, &self.payload)
    }
}

fn parse_sign1(input: &[u8]) -> Result<SignedToken, String> {
    if input.is_empty() {
        return Err("empty input".to_string());
    }

    let mut dec = Decoder::new(input);

    if matches!(dec.datatype().map_err(|e| e.to_string())?, Type::Tag) {
        let tag = dec.tag().map_err(|e| format!("failed to read CBOR tag: {e}"))?;
        if tag != Tag::new(COSE_SIGN1_TAG) {
            return Err("unexpected CBOR tag (expected COSE_Sign1 tag 18 or no tag)".to_string());
        }
    }

    let len = dec
        .array()
        .map_err(|e| format!("top-level item is not an array: {e}"))?
        .ok_or_else(|| "indefinite-length arrays are not supported".to_string())?;
    if len != 4 {
        return Err(format!("COSE_Sign1 array has {len} items, expected 4"));
    }

    let protected_bytes = dec
        .bytes()
        .map_err(|e| format!("failed to read protected headers (bstr): {e}"))?
        .to_vec();
    let protected = if protected_bytes.is_empty() {
        CborValue::Map(Vec::new())
    } else {
        CborValue::decode(&protected_bytes).map_err(|e| e.to_string())?
    };
    if protected.entries().is_none() {
        return Err("protected headers are not a map".to_string());
    }

    if !matches!(dec.datatype().map_err(|e| e.to_string())?, Type::Map) {
        return Err("unprotected headers are not a map".to_string());
    }
    let unprotected = CborValue::decode_from(&mut dec).map_err(|e| e.to_string())?;

    let payload = match dec.datatype().map_err(|e| e.to_string())? {
        Type::Bytes => dec
            .bytes()
            .map_err(|e| format!("failed to read payload: {e}"))?
            .to_vec(),
        Type::Null => return Err("detached payloads are not supported".to_string()),
        other => return Err(format!("payload must be a bstr, got {other:?}")),
    };

    let signature = dec
        .bytes()
        .map_err(|e| format!("failed to read signature (bstr): {e}"))?
        .to_vec();

    if dec.position() != input.len() {
        return Err("trailing bytes after COSE_Sign1".to_string());
    }

    Ok(SignedToken {
        protected_bytes,
        protected,
        unprotected,
        payload,
        signature,
    })
}

/// Encode `["Signature1", protected, h'', payload]`.
fn encode_sig_structure(protected: &[u8], payload: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let mut out = Vec::with_capacity(32 + protected.len() + payload.len());
    let mut enc = Encoder::new(&mut out);
    enc.array(4)
        .and_then(|e| e.str(SIG_STRUCTURE_CONTEXT))
        .and_then(|e| e.bytes(protected))
        .and_then(|e| e.bytes(&[]))
        .and_then(|e| e.bytes(payload))
        .map_err(|e| VerifyError::decode(e.to_string()))?;
    Ok(out)
}

/// Sign `payload` into a tagged COSE_Sign1 with `{1: alg, 4: kid}` protected.
///
/// Used to mint fixtures and by the CLI's round-trip tooling.
pub fn sign(signer: &dyn Signer, kid: &[u8], payload: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let protected = CborValue::Map(vec![
        (
            CborValue::Integer(HEADER_ALG),
            CborValue::Integer(signer.algorithm().cose_id()),
        ),
        (CborValue::Integer(HEADER_KID), CborValue::Bytes(kid.to_vec())),
    ])
    .to_vec()?;

    let to_be_signed = encode_sig_structure(&protected, payload)?;
    let signature = signer.sign(&to_be_signed)?;

    CborValue::Tagged(
        COSE_SIGN1_TAG,
        Box::new(CborValue::Array(vec![
            CborValue::Bytes(protected),
            CborValue::Map(Vec::new()),
            CborValue::Bytes(payload.to_vec()),
            CborValue::Bytes(signature),
        ])),
    )
    .to_vec()
}
