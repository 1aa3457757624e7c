//! CBOR shapes of the published revocation lists.
//!
//! Each list is a COSE_Sign1 message signed by the revocation list key:
//!
//! ```text
//! kid.lst    { h'kid': { h'0a': count, ... }, ... }
//! index.lst  { h'b1': [ts, count, { h'b2': [ts, count], ... }], ... }
//! chunk.lst  [ h'partial hash', ... ]
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use hcert_crypto::{verify_signature, PublicKey};
use tracing::debug;

use super::{Chunk, ChunkSummary, IndexEntry, KidEntry, RevocationIndexMap, RevocationSource};
use crate::cbor::CborValue;
use crate::cose::{KeyId, SignedToken};
use crate::error::VerifyError;

/// Transport for the raw signed lists. `None` means the list is not
/// published.
#[async_trait]
pub trait SignedListFetcher: Send + Sync {
    /// Raw `kid.lst`.
    async fn fetch_kid_list(&self) -> Result<Option<Vec<u8>>, VerifyError>;

    /// Raw `index.lst` of `(kid, variant)`.
    async fn fetch_index(&self, kid: &KeyId, variant: u8) -> Result<Option<Vec<u8>>, VerifyError>;

    /// Raw `chunk.lst` of a byte1 bucket, or of a byte2 bucket when `byte2`
    /// is given.
    async fn fetch_chunk(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
        byte2: Option<u8>,
    ) -> Result<Option<Vec<u8>>, VerifyError>;
}

/// [`RevocationSource`] over signed lists, each checked against the
/// revocation list key before it is decoded.
pub struct SignedListSource<F> {
    fetcher: F,
    key: PublicKey,
}

impl<F: SignedListFetcher> SignedListSource<F> {
    /// Create a source verifying every list with `key`.
    pub fn new(fetcher: F, key: PublicKey) -> Self {
        Self { fetcher, key }
    }

    fn open<T>(
        &self,
        raw: Option<Vec<u8>>,
        parse: impl FnOnce(&CborValue) -> Result<T, VerifyError>,
    ) -> Result<T, VerifyError>
    where
        T: Default,
    {
        match raw {
            Some(bytes) => parse(&open_signed_list(&bytes, &self.key)?),
            None => Ok(T::default()),
        }
    }
}

#[async_trait]
impl<F: SignedListFetcher> RevocationSource for SignedListSource<F> {
    async fn get_kid_list(&self) -> Result<Vec<KidEntry>, VerifyError> {
        let raw = self.fetcher.fetch_kid_list().await?;
        self.open(raw, parse_kid_list)
    }

    async fn get_index(&self, kid: &KeyId, variant: u8) -> Result<RevocationIndexMap, VerifyError> {
        let raw = self.fetcher.fetch_index(kid, variant).await?;
        if raw.is_none() {
            debug!(%kid, variant, "No index published");
        }
        self.open(raw, parse_index)
    }

    async fn get_byte_one_chunk(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
    ) -> Result<Chunk, VerifyError> {
        let raw = self.fetcher.fetch_chunk(kid, variant, byte1, None).await?;
        self.open(raw, parse_chunk)
    }

    async fn get_byte_two_chunk(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
        byte2: u8,
    ) -> Result<Chunk, VerifyError> {
        let raw = self.fetcher.fetch_chunk(kid, variant, byte1, Some(byte2)).await?;
        self.open(raw, parse_chunk)
    }
}

/// Verify a signed list with the revocation list key and decode its payload.
pub(crate) fn open_signed_list(bytes: &[u8], key: &PublicKey) -> Result<CborValue, VerifyError> {
    let token = SignedToken::parse(bytes)?;
    let tbs = token.sig_structure()?;
    if !verify_signature(token.algorithm()?, key, &tbs, token.signature())? {
        return Err(VerifyError::source("revocation list signature invalid"));
    }
    CborValue::decode(token.payload())
}

/// Decode `kid.lst`.
pub(crate) fn parse_kid_list(value: &CborValue) -> Result<Vec<KidEntry>, VerifyError> {
    entries(value, "kid list")?
        .iter()
        .map(|(kid, variants)| {
            let hash_variants = entries(variants, "hash variant map")?
                .iter()
                .map(|(variant, count)| Ok((first_byte(variant)?, count_of(count)?)))
                .collect::<Result<BTreeMap<_, _>, VerifyError>>()?;
            Ok(KidEntry {
                kid: KeyId::new(bytes_of(kid)?),
                hash_variants,
            })
        })
        .collect()
}

/// Decode `index.lst`.
pub(crate) fn parse_index(value: &CborValue) -> Result<RevocationIndexMap, VerifyError> {
    entries(value, "index")?
        .iter()
        .map(|(byte1, entry)| {
            let items = entry
                .as_array()
                .ok_or_else(|| VerifyError::source("index entry is not an array"))?;
            let byte2 = match items.get(2) {
                Some(map) => Some(
                    entries(map, "byte2 map")?
                        .iter()
                        .map(|(b2, summary)| {
                            let parts = summary.as_array().unwrap_or_default();
                            Ok((first_byte(b2)?, summary_of(parts)))
                        })
                        .collect::<Result<BTreeMap<_, _>, VerifyError>>()?,
                ),
                None => None,
            };
            Ok((
                first_byte(byte1)?,
                IndexEntry {
                    summary: summary_of(items),
                    byte2,
                },
            ))
        })
        .collect()
}

/// Decode `chunk.lst`. Both arrays and maps of byte strings are accepted.
pub(crate) fn parse_chunk(value: &CborValue) -> Result<Chunk, VerifyError> {
    let items: Vec<&CborValue> = match value.untagged() {
        CborValue::Array(items) => items.iter().collect(),
        CborValue::Map(pairs) => pairs.iter().map(|(_, v)| v).collect(),
        _ => return Err(VerifyError::source("chunk is neither array nor map")),
    };
    items
        .into_iter()
        .map(|item| bytes_of(item).map(<[u8]>::to_vec))
        .collect()
}

fn entries<'a>(
    value: &'a CborValue,
    what: &str,
) -> Result<&'a [(CborValue, CborValue)], VerifyError> {
    value
        .entries()
        .ok_or_else(|| VerifyError::source(format!("{what} is not a map")))
}

fn bytes_of(value: &CborValue) -> Result<&[u8], VerifyError> {
    value
        .as_bytes()
        .ok_or_else(|| VerifyError::source("expected a byte string"))
}

fn first_byte(value: &CborValue) -> Result<u8, VerifyError> {
    bytes_of(value)?
        .first()
        .copied()
        .ok_or_else(|| VerifyError::source("empty byte key"))
}

fn count_of(value: &CborValue) -> Result<u32, VerifyError> {
    value
        .as_i64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| VerifyError::source("expected a non-negative count"))
}

fn summary_of(items: &[CborValue]) -> ChunkSummary {
    ChunkSummary {
        timestamp: items.first().and_then(CborValue::as_i64),
        count: items
            .get(1)
            .and_then(CborValue::as_i64)
            .and_then(|n| u32::try_from(n).ok()),
    }
}
