//! Offline mirror of the revocation levels.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use super::{Chunk, ChunkSummary, KidEntry, RevocationIndexMap, RevocationSource};
use crate::cose::KeyId;
use crate::error::VerifyError;

type IndexKey = (KeyId, u8);
type ByteOneKey = (KeyId, u8, u8);
type ByteTwoKey = (KeyId, u8, u8, u8);

#[derive(Debug, Clone)]
struct StoredChunk {
    summary: ChunkSummary,
    entries: Chunk,
}

#[derive(Debug, Default)]
struct StoreState {
    kid_list: Vec<KidEntry>,
    indexes: HashMap<IndexKey, RevocationIndexMap>,
    byte_one: HashMap<ByteOneKey, StoredChunk>,
    byte_two: HashMap<ByteTwoKey, StoredChunk>,
}

impl StoreState {
    fn drop_variant(&mut self, kid: &KeyId, variant: u8) {
        self.indexes.remove(&(kid.clone(), variant));
        self.byte_one.retain(|(k, v, _), _| !(k == kid && *v == variant));
        self.byte_two.retain(|(k, v, _, _), _| !(k == kid && *v == variant));
    }
}

/// In-memory store of the revocation levels with per-key transactional
/// replacement.
///
/// Every `replace_*` call is a single write-locked delete-then-insert, so a
/// reader sees a bucket either before or after the replacement.
#[derive(Debug, Default)]
pub struct LocalRevocationStore {
    state: RwLock<StoreState>,
}

impl LocalRevocationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the kid list. Data of kids, and of variants, that are no
    /// longer listed is removed.
    pub fn replace_kid_list(&self, kid_list: Vec<KidEntry>) -> Result<(), VerifyError> {
        let mut state = self.write()?;
        let mut stored: HashSet<IndexKey> = state.indexes.keys().cloned().collect();
        stored.extend(state.byte_one.keys().map(|(k, v, _)| (k.clone(), *v)));
        stored.extend(state.byte_two.keys().map(|(k, v, _, _)| (k.clone(), *v)));

        let stale: Vec<IndexKey> = stored
            .into_iter()
            .filter(|(kid, variant)| {
                !kid_list
                    .iter()
                    .any(|e| &e.kid == kid && e.hash_variants.contains_key(variant))
            })
            .collect();
        for (kid, variant) in &stale {
            state.drop_variant(kid, *variant);
        }
        debug!(kids = kid_list.len(), removed = stale.len(), "Replaced revocation kid list");
        state.kid_list = kid_list;
        Ok(())
    }

    /// Replace the index of `(kid, variant)`. Chunks whose bucket is no
    /// longer indexed are removed.
    pub fn replace_index(
        &self,
        kid: &KeyId,
        variant: u8,
        index: RevocationIndexMap,
    ) -> Result<(), VerifyError> {
        let mut state = self.write()?;
        state.byte_one.retain(|(k, v, b1), _| {
            !(k == kid && *v == variant) || index.contains_key(b1)
        });
        state.byte_two.retain(|(k, v, b1, b2), _| {
            !(k == kid && *v == variant)
                || index
                    .get(b1)
                    .and_then(|entry| entry.byte2.as_ref())
                    .is_some_and(|b2s| b2s.contains_key(b2))
        });
        state.indexes.insert((kid.clone(), variant), index);
        Ok(())
    }

    /// Replace a byte1 chunk, remembering the summary it was fetched under.
    pub fn replace_byte_one(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
        summary: ChunkSummary,
        entries: Chunk,
    ) -> Result<(), VerifyError> {
        self.write()?
            .byte_one
            .insert((kid.clone(), variant, byte1), StoredChunk { summary, entries });
        Ok(())
    }

    /// Replace a byte2 chunk, remembering the summary it was fetched under.
    pub fn replace_byte_two(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
        byte2: u8,
        summary: ChunkSummary,
        entries: Chunk,
    ) -> Result<(), VerifyError> {
        self.write()?.byte_two.insert(
            (kid.clone(), variant, byte1, byte2),
            StoredChunk { summary, entries },
        );
        Ok(())
    }

    /// Summary the stored byte1 chunk was fetched under.
    pub fn byte_one_summary(&self, kid: &KeyId, variant: u8, byte1: u8) -> Option<ChunkSummary> {
        let state = self.state.read().ok()?;
        state
            .byte_one
            .get(&(kid.clone(), variant, byte1))
            .map(|c| c.summary)
    }

    /// Summary the stored byte2 chunk was fetched under.
    pub fn byte_two_summary(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
        byte2: u8,
    ) -> Option<ChunkSummary> {
        let state = self.state.read().ok()?;
        state
            .byte_two
            .get(&(kid.clone(), variant, byte1, byte2))
            .map(|c| c.summary)
    }

    /// Every stored `(kid, variant)` index.
    pub fn indexes(&self) -> Result<Vec<(KeyId, u8, RevocationIndexMap)>, VerifyError> {
        let state = self.read()?;
        let mut out: Vec<_> = state
            .indexes
            .iter()
            .map(|((kid, variant), index)| (kid.clone(), *variant, index.clone()))
            .collect();
        out.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        Ok(out)
    }

    /// Number of stored `(byte1 chunks, byte2 chunks)`.
    pub fn chunk_counts(&self) -> (usize, usize) {
        self.state
            .read()
            .map(|s| (s.byte_one.len(), s.byte_two.len()))
            .unwrap_or_default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>, VerifyError> {
        self.state
            .read()
            .map_err(|_| VerifyError::revocation_unavailable("revocation store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, VerifyError> {
        self.state
            .write()
            .map_err(|_| VerifyError::revocation_unavailable("revocation store lock poisoned"))
    }
}

#[async_trait]
impl RevocationSource for LocalRevocationStore {
    async fn get_kid_list(&self) -> Result<Vec<KidEntry>, VerifyError> {
        Ok(self.read()?.kid_list.clone())
    }

    async fn get_index(&self, kid: &KeyId, variant: u8) -> Result<RevocationIndexMap, VerifyError> {
        Ok(self
            .read()?
            .indexes
            .get(&(kid.clone(), variant))
            .cloned()
            .unwrap_or_else(BTreeMap::new))
    }

    async fn get_byte_one_chunk(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
    ) -> Result<Chunk, VerifyError> {
        Ok(self
            .read()?
            .byte_one
            .get(&(kid.clone(), variant, byte1))
            .map(|c| c.entries.clone())
            .unwrap_or_default())
    }

    async fn get_byte_two_chunk(
        &self,
        kid: &KeyId,
        variant: u8,
        byte1: u8,
        byte2: u8,
    ) -> Result<Chunk, VerifyError> {
        Ok(self
            .read()?
            .byte_two
            .get(&(kid.clone(), variant, byte1, byte2))
            .map(|c| c.entries.clone())
            .unwrap_or_default())
    }
}
