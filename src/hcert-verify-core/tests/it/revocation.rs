//! Revocation lookup against published list shapes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hcert_crypto::SignatureAlgorithm;
use hcert_verify_core::revocation::{
    Chunk, ChunkSummary, IndexEntry, KidEntry, RevocationIndexMap, SyncReport,
};
use hcert_verify_core::{
    CancellationFlag, HashVariant, KeyId, LocalRevocationStore, RevocationCandidate,
    RevocationIndex, RevocationOutcome, RevocationSource, RevocationSync, VerifyError,
};

#[derive(Default)]
struct Calls {
    kid_list: AtomicUsize,
    index: AtomicUsize,
    chunks: AtomicUsize,
}

/// In-memory publisher that serves one index and chunk pair for every key.
#[derive(Default)]
struct FakeSource {
    kid_list: Vec<KidEntry>,
    index: RevocationIndexMap,
    byte_one: Chunk,
    byte_two: Chunk,
    calls: Calls,
}

#[async_trait]
impl RevocationSource for FakeSource {
    async fn get_kid_list(&self) -> Result<Vec<KidEntry>, VerifyError> {
        self.calls.kid_list.fetch_add(1, Ordering::SeqCst);
        Ok(self.kid_list.clone())
    }

    async fn get_index(&self, _kid: &KeyId, _variant: u8) -> Result<RevocationIndexMap, VerifyError> {
        self.calls.index.fetch_add(1, Ordering::SeqCst);
        Ok(self.index.clone())
    }

    async fn get_byte_one_chunk(&self, _kid: &KeyId, _variant: u8, _byte1: u8) -> Result<Chunk, VerifyError> {
        self.calls.chunks.fetch_add(1, Ordering::SeqCst);
        Ok(self.byte_one.clone())
    }

    async fn get_byte_two_chunk(
        &self,
        _kid: &KeyId,
        _variant: u8,
        _byte1: u8,
        _byte2: u8,
    ) -> Result<Chunk, VerifyError> {
        self.calls.chunks.fetch_add(1, Ordering::SeqCst);
        Ok(self.byte_two.clone())
    }
}

fn kid(hex_kid: &str) -> KeyId {
    KeyId::new(&hex::decode(hex_kid).unwrap())
}

fn summary(timestamp: i64) -> ChunkSummary {
    ChunkSummary {
        timestamp: Some(timestamp),
        count: Some(1),
    }
}

fn kid_list() -> Vec<KidEntry> {
    vec![
        KidEntry {
            kid: kid("ea3ab2264f346d45"),
            hash_variants: BTreeMap::from([(0x0a, 538)]),
        },
        KidEntry {
            kid: kid("f5c5970c3039d854"),
            hash_variants: BTreeMap::from([(0x0a, 7), (0x0b, 1), (0x0c, 1)]),
        },
        KidEntry {
            kid: kid("f50159a32d84e89d"),
            hash_variants: BTreeMap::from([(0x0b, 5)]),
        },
    ]
}

fn index() -> RevocationIndexMap {
    let entry = |ts: i64, byte2: u8, ts2: i64| IndexEntry {
        summary: summary(ts),
        byte2: Some(BTreeMap::from([(byte2, summary(ts2))])),
    };
    BTreeMap::from([
        (0xa6, entry(1_646_129_242, 0xb8, 1_646_129_242)),
        (0xb4, entry(1_646_044_012, 0x65, 1_646_044_012)),
        (0xec, entry(1_646_129_243, 0xe1, 1_646_129_243)),
        (0xee, entry(1_649_087_075, 0x36, 1_649_087_075)),
    ])
}

fn chunk() -> Chunk {
    vec![hex::decode("a6b8a01b67030f32e0e3d7052a71a688").unwrap()]
}

fn full_source() -> FakeSource {
    FakeSource {
        kid_list: kid_list(),
        index: index(),
        byte_one: chunk(),
        byte_two: chunk(),
        ..FakeSource::default()
    }
}

fn candidate() -> RevocationCandidate {
    let mut signature =
        hex::decode("aa9ffbe3461d38427198aeaefc1f87df04c1055f28163bd734de983855c70c29").unwrap();
    signature.extend_from_slice(&[0x55; 32]);
    RevocationCandidate {
        kid: KeyId::from_base64("9cWXDDA52FQ=").unwrap(),
        uci: "URN:UVCI:V1:DE:MNI5SHBAVDC5JWF0WI63I5IQ68".into(),
        issuer_country: "DE".into(),
        algorithm: SignatureAlgorithm::Es256,
        signature,
    }
}

async fn is_revoked(source: FakeSource) -> bool {
    RevocationIndex::new(Arc::new(source))
        .lookup(&candidate())
        .await
        .unwrap()
        .is_some()
}

#[tokio::test]
async fn test_published_list_shapes() {
    assert!(!is_revoked(FakeSource { kid_list: Vec::new(), ..full_source() }).await);
    assert!(!is_revoked(FakeSource { index: BTreeMap::new(), ..full_source() }).await);
    assert!(
        !is_revoked(FakeSource {
            byte_one: Vec::new(),
            byte_two: Vec::new(),
            ..full_source()
        })
        .await
    );
    assert!(is_revoked(FakeSource { byte_one: Vec::new(), ..full_source() }).await);
    assert!(is_revoked(FakeSource { byte_two: Vec::new(), ..full_source() }).await);
    assert!(is_revoked(full_source()).await);
}

#[tokio::test]
async fn test_matching_variant_reported() {
    let outcome = RevocationIndex::new(Arc::new(full_source()))
        .check(&candidate())
        .await;
    assert_eq!(
        outcome,
        RevocationOutcome::Revoked {
            variant: HashVariant::Signature
        }
    );
}

#[tokio::test]
async fn test_unknown_kid_fetches_nothing_else() {
    let source = Arc::new(full_source());
    let index = RevocationIndex::new(source.clone());
    let mut stranger = candidate();
    stranger.kid = kid("0102030405060708");

    assert_eq!(index.lookup(&stranger).await.unwrap(), None);
    assert_eq!(source.calls.kid_list.load(Ordering::SeqCst), 1);
    assert_eq!(source.calls.index.load(Ordering::SeqCst), 0);
    assert_eq!(source.calls.chunks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_bucket_skips_chunks() {
    let source = Arc::new(FakeSource {
        index: BTreeMap::from([(0xa6, IndexEntry {
            summary: summary(1),
            byte2: Some(BTreeMap::from([(0x00, summary(1))])),
        })]),
        ..full_source()
    });
    let index = RevocationIndex::new(source.clone());
    assert_eq!(index.lookup(&candidate()).await.unwrap(), None);
    // One index per listed variant, no chunk since no bucket matched
    assert_eq!(source.calls.index.load(Ordering::SeqCst), 3);
    assert_eq!(source.calls.chunks.load(Ordering::SeqCst), 0);
}

struct BrokenSource;

#[async_trait]
impl RevocationSource for BrokenSource {
    async fn get_kid_list(&self) -> Result<Vec<KidEntry>, VerifyError> {
        Ok(kid_list())
    }
    async fn get_index(&self, _kid: &KeyId, _variant: u8) -> Result<RevocationIndexMap, VerifyError> {
        Err(VerifyError::source("index storage corrupt"))
    }
    async fn get_byte_one_chunk(&self, _kid: &KeyId, _variant: u8, _byte1: u8) -> Result<Chunk, VerifyError> {
        Ok(Vec::new())
    }
    async fn get_byte_two_chunk(
        &self,
        _kid: &KeyId,
        _variant: u8,
        _byte1: u8,
        _byte2: u8,
    ) -> Result<Chunk, VerifyError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_source_failure_is_unavailable() {
    let index = RevocationIndex::new(Arc::new(BrokenSource));
    let err = index.lookup(&candidate()).await.unwrap_err();
    assert!(matches!(err, VerifyError::RevocationCheckUnavailable { .. }));
    assert!(matches!(
        index.check(&candidate()).await,
        RevocationOutcome::Unavailable { .. }
    ));
}

#[tokio::test]
async fn test_sync_then_lookup_locally() {
    let remote = full_source();
    let local = Arc::new(LocalRevocationStore::new());

    let report: SyncReport = RevocationSync::new(&remote, &local).run().await.unwrap();
    assert_eq!(report.kids, 3);
    assert!(report.chunks_fetched > 0);

    let fetched = remote.calls.chunks.load(Ordering::SeqCst);
    let again = RevocationSync::new(&remote, &local).run().await.unwrap();
    assert_eq!(again.chunks_fetched, 0);
    assert_eq!(remote.calls.chunks.load(Ordering::SeqCst), fetched);

    let outcome = RevocationIndex::new(local.clone()).check(&candidate()).await;
    assert!(outcome.is_revoked());
}

#[tokio::test]
async fn test_cancelled_sync_writes_nothing() {
    let remote = full_source();
    let local = LocalRevocationStore::new();
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let err = RevocationSync::new(&remote, &local)
        .with_cancellation(cancel)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Cancelled));
    assert!(local.indexes().unwrap().is_empty());
}
