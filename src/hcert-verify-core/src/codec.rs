//! QR text ⇄ COSE bytes.
//!
//! `HC1:` + Base45( zlib( COSE_Sign1 ) )

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use crate::base45;
use crate::cose::SignedToken;
use crate::error::VerifyError;

/// Strip `prefix` if present, Base45-decode and inflate.
///
/// Inflated output larger than `max_size` is rejected.
pub fn decode_raw_token(qr_text: &str, prefix: &str, max_size: usize) -> Result<Vec<u8>, VerifyError> {
    let body = qr_text.strip_prefix(prefix).unwrap_or(qr_text);
    let compressed = base45::decode(body)?;
    let cose = inflate(&compressed, max_size)?;
    debug!(
        compressed = compressed.len(),
        inflated = cose.len(),
        "Decoded raw token"
    );
    Ok(cose)
}

/// Compress, Base45-encode and prefix COSE bytes.
pub fn encode_raw_token(cose: &[u8], prefix: &str) -> Result<String, VerifyError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(cose)
        .map_err(|e| VerifyError::decode(format!("zlib compression failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| VerifyError::decode(format!("zlib compression failed: {e}")))?;
    Ok(format!("{prefix}{}", base45::encode(&compressed)))
}

/// Parse COSE_Sign1 bytes.
pub fn parse_cose_sign1(bytes: &[u8]) -> Result<SignedToken, VerifyError> {
    SignedToken::parse(bytes)
}

fn inflate(compressed: &[u8], max_size: usize) -> Result<Vec<u8>, VerifyError> {
    let limit = u64::try_from(max_size).unwrap_or(u64::MAX).saturating_add(1);
    let mut out = Vec::new();
    ZlibDecoder::new(compressed)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|e| VerifyError::decode(format!("not a valid zlib stream: {e}")))?;
    if out.len() > max_size {
        return Err(VerifyError::decode(format!(
            "inflated payload exceeds {max_size} bytes"
        )));
    }
    Ok(out)
}
