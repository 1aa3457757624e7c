//! Trusted Document Signer Certificates.
//!
//! ## Security Properties
//!
//! - **Atomic replacement**: the registry is one immutable snapshot with an
//!   eagerly built kid index; a refresh swaps it whole or not at all
//! - **Key rotation**: several certificates may share a kid, and all of
//!   them are offered as candidates
//! - **Usage binding**: a DSC restricted by extended key usage to some
//!   certificate types cannot sign the others

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hcert_crypto::PublicKey;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use x509_parser::extensions::ParsedExtension;

use crate::certificate::CertificateType;
use crate::cose::KeyId;
use crate::error::VerifyError;
use crate::snapshot::Snapshot;
use crate::trust_list::TrustList;

/// EKU OIDs marking a DSC as allowed to sign test certificates.
pub const TEST_OIDS: [&str; 2] = ["1.3.6.1.4.1.1847.2021.1.1", "1.3.6.1.4.1.0.1847.2021.1.1"];
/// EKU OIDs marking a DSC as allowed to sign vaccination certificates.
pub const VACCINATION_OIDS: [&str; 2] =
    ["1.3.6.1.4.1.1847.2021.1.2", "1.3.6.1.4.1.0.1847.2021.1.2"];
/// EKU OIDs marking a DSC as allowed to sign recovery certificates.
pub const RECOVERY_OIDS: [&str; 2] = ["1.3.6.1.4.1.1847.2021.1.3", "1.3.6.1.4.1.0.1847.2021.1.3"];

/// An issuer's signing certificate.
#[derive(Debug, Clone)]
pub struct TrustedCertificate {
    /// Issuing country (ISO 3166 alpha-2).
    pub country: String,
    /// Key identifier.
    pub kid: KeyId,
    /// Verification key.
    pub public_key: PublicKey,
    /// Start of the certificate's validity window, if known.
    pub not_before: Option<DateTime<Utc>>,
    /// End of the certificate's validity window, if known.
    pub not_after: Option<DateTime<Utc>>,
    /// Extended key usage OIDs in dotted form.
    pub extended_key_usage: Vec<String>,
}

impl TrustedCertificate {
    /// A bare key with no validity window and no usage restriction.
    pub fn new(country: impl Into<String>, kid: KeyId, public_key: PublicKey) -> Self {
        Self {
            country: country.into(),
            kid,
            public_key,
            not_before: None,
            not_after: None,
            extended_key_usage: Vec::new(),
        }
    }

    /// Parse a DER-encoded X.509 DSC.
    pub fn from_der(country: impl Into<String>, kid: KeyId, der: &[u8]) -> Result<Self, VerifyError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| VerifyError::trust_list(format!("invalid certificate DER: {e}")))?;

        let public_key = PublicKey::from_spki_der(cert.tbs_certificate.subject_pki.raw)?;
        let validity = cert.validity();
        let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0);
        let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0);

        let mut extended_key_usage = Vec::new();
        for ext in cert.extensions() {
            if let ParsedExtension::ExtendedKeyUsage(eku) = ext.parsed_extension() {
                extended_key_usage.extend(eku.other.iter().map(|oid| oid.to_id_string()));
            }
        }

        Ok(Self {
            country: country.into(),
            kid,
            public_key,
            not_before,
            not_after,
            extended_key_usage,
        })
    }

    /// The conventional kid of a DSC: the first 8 bytes of SHA-256(DER).
    #[must_use]
    pub fn derive_kid(der: &[u8]) -> KeyId {
        KeyId::new(&Sha256::digest(der))
    }

    /// Whether `now` lies inside the certificate's own validity window.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |nb| nb <= now) && self.not_after.map_or(true, |na| now <= na)
    }

    /// Whether the DSC may sign certificates of `certificate_type`.
    ///
    /// A DSC carrying none of the health-certificate EKU OIDs may sign any
    /// type.
    #[must_use]
    pub fn permits(&self, certificate_type: CertificateType) -> bool {
        let has = |oids: &[&str]| {
            self.extended_key_usage
                .iter()
                .any(|eku| oids.contains(&eku.as_str()))
        };
        if !has(&TEST_OIDS) && !has(&VACCINATION_OIDS) && !has(&RECOVERY_OIDS) {
            return true;
        }
        match certificate_type {
            CertificateType::Test => has(&TEST_OIDS),
            CertificateType::Vaccination => has(&VACCINATION_OIDS),
            CertificateType::Recovery => has(&RECOVERY_OIDS),
        }
    }
}

/// One immutable generation of trusted certificates.
#[derive(Debug, Default)]
pub struct TrustSnapshot {
    certificates: Vec<Arc<TrustedCertificate>>,
    by_kid: HashMap<KeyId, Vec<Arc<TrustedCertificate>>>,
}

impl TrustSnapshot {
    fn build(certs: impl IntoIterator<Item = TrustedCertificate>) -> Self {
        let certificates: Vec<_> = certs.into_iter().map(Arc::new).collect();
        let mut by_kid: HashMap<KeyId, Vec<Arc<TrustedCertificate>>> = HashMap::new();
        for cert in &certificates {
            by_kid.entry(cert.kid.clone()).or_default().push(Arc::clone(cert));
        }
        Self {
            certificates,
            by_kid,
        }
    }

    /// Certificates registered under `kid`, in registry order.
    #[must_use]
    pub fn find_by_kid(&self, kid: &KeyId) -> &[Arc<TrustedCertificate>] {
        self.by_kid.get(kid).map_or(&[], Vec::as_slice)
    }

    /// Every certificate, in registry order.
    #[must_use]
    pub fn all(&self) -> &[Arc<TrustedCertificate>] {
        &self.certificates
    }

    /// Number of certificates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// Remote source of the DSC trust list document.
#[async_trait]
pub trait TrustListSource: Send + Sync {
    /// Fetch the trust list JSON document.
    async fn fetch_trust_list(&self) -> Result<String, VerifyError>;
}

/// Registry of trusted DSCs, replaced wholesale on refresh.
#[derive(Debug, Default)]
pub struct TrustRegistry {
    snapshot: Snapshot<TrustSnapshot>,
}

impl TrustRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `certs`.
    pub fn with_certificates(certs: impl IntoIterator<Item = TrustedCertificate>) -> Self {
        Self {
            snapshot: Snapshot::new(TrustSnapshot::build(certs)),
        }
    }

    /// Atomically replace every trusted certificate.
    pub fn replace(&self, certs: impl IntoIterator<Item = TrustedCertificate>) {
        let next = TrustSnapshot::build(certs);
        info!(certificates = next.len(), kids = next.by_kid.len(), "Trust registry replaced");
        self.snapshot.store(next);
    }

    /// The current snapshot. Holding it pins one consistent generation.
    pub fn snapshot(&self) -> Arc<TrustSnapshot> {
        self.snapshot.load()
    }

    /// Certificates registered under `kid`; empty if unknown.
    pub fn find_by_kid(&self, kid: &KeyId) -> Vec<Arc<TrustedCertificate>> {
        self.snapshot().find_by_kid(kid).to_vec()
    }

    /// Number of certificates in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the current snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Fetch, parse and install a fresh trust list.
    ///
    /// On any failure the current snapshot is left untouched.
    #[instrument(skip(self, source))]
    pub async fn refresh(
        &self,
        source: &dyn TrustListSource,
        timeout: Duration,
    ) -> Result<usize, VerifyError> {
        let document = tokio::time::timeout(timeout, source.fetch_trust_list())
            .await
            .map_err(|_| VerifyError::source("trust list fetch timed out"))?
            .map_err(|e| {
                warn!(error = %e, "Trust list fetch failed");
                e
            })?;

        let certs = TrustList::from_json(&document)?;
        if certs.is_empty() {
            // An empty list would disable verification entirely
            return Err(VerifyError::trust_list("trust list contains no usable certificates"));
        }

        let count = certs.len();
        self.replace(certs);
        debug!(certificates = count, "Trust list refreshed");
        Ok(count)
    }
}
