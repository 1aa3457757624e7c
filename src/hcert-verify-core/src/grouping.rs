//! Grouping of certificates by holder.
//!
//! Holders are identified by their ICAO-transliterated names and date of
//! birth, normalised so spelling variants of the same MRZ name collapse
//! into one group.

use chrono::{DateTime, Utc};

use crate::certificate::{CertificateEntry, HealthCertificate};

/// Normalised holder identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HolderId {
    /// Normalised family name.
    pub family_name: String,
    /// Normalised given name.
    pub given_name: String,
    /// Date of birth as printed.
    pub date_of_birth: String,
}

impl HolderId {
    /// Identity of the holder of `certificate`.
    #[must_use]
    pub fn of(certificate: &HealthCertificate) -> Self {
        let name = &certificate.name;
        let family = name
            .family_name_transliterated
            .as_deref()
            .or(name.family_name.as_deref())
            .unwrap_or("");
        let given = name
            .given_name_transliterated
            .as_deref()
            .or(name.given_name.as_deref())
            .unwrap_or("");
        Self {
            family_name: normalize(family),
            given_name: normalize(given),
            date_of_birth: certificate.date_of_birth.trim().to_string(),
        }
    }
}

/// `"  Erika-Maria  MUSTERMANN "` → `"ERIKA<MARIA<MUSTERMANN"`.
fn normalize(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '<' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("<")
}

/// All certificates of one holder.
#[derive(Debug, Clone)]
pub struct CertificateGroup {
    id: HolderId,
    certificates: Vec<HealthCertificate>,
}

impl CertificateGroup {
    /// Holder identity.
    #[must_use]
    pub fn id(&self) -> &HolderId {
        &self.id
    }

    /// Certificates in insertion order.
    #[must_use]
    pub fn certificates(&self) -> &[HealthCertificate] {
        &self.certificates
    }

    /// Unexpired vaccinations, most recent first.
    #[must_use]
    pub fn vaccinations(&self, now: DateTime<Utc>) -> Vec<&HealthCertificate> {
        let mut found: Vec<_> = self
            .unexpired(now)
            .filter(|c| matches!(c.entry, CertificateEntry::Vaccination(_)))
            .collect();
        found.sort_by_key(|c| match &c.entry {
            CertificateEntry::Vaccination(v) => std::cmp::Reverse(v.occurrence),
            _ => std::cmp::Reverse(None),
        });
        found
    }

    /// Most recent unexpired vaccination.
    #[must_use]
    pub fn latest_vaccination(&self, now: DateTime<Utc>) -> Option<&HealthCertificate> {
        self.vaccinations(now).into_iter().next()
    }

    /// Unexpired recovery with the most recent first positive result.
    #[must_use]
    pub fn latest_recovery(&self, now: DateTime<Utc>) -> Option<&HealthCertificate> {
        self.unexpired(now)
            .filter_map(|c| match &c.entry {
                CertificateEntry::Recovery(r) => Some((r.first_result, c)),
                _ => None,
            })
            .max_by_key(|(date, _)| *date)
            .map(|(_, c)| c)
    }

    /// Unexpired test with the most recent sample collection.
    #[must_use]
    pub fn latest_test(&self, now: DateTime<Utc>) -> Option<&HealthCertificate> {
        self.unexpired(now)
            .filter_map(|c| match &c.entry {
                CertificateEntry::Test(t) => Some((t.sample_collection, c)),
                _ => None,
            })
            .max_by_key(|(at, _)| *at)
            .map(|(_, c)| c)
    }

    fn unexpired(&self, now: DateTime<Utc>) -> impl Iterator<Item = &HealthCertificate> {
        self.certificates.iter().filter(move |c| c.expires_at >= now)
    }
}

/// Group `certificates` by holder, in order of each holder's first
/// certificate. Certificates with an already-seen UCI are dropped.
pub fn group_certificates(
    certificates: impl IntoIterator<Item = HealthCertificate>,
) -> Vec<CertificateGroup> {
    let mut groups: Vec<CertificateGroup> = Vec::new();

    for certificate in certificates {
        let id = HolderId::of(&certificate);
        match groups.iter_mut().find(|g| g.id == id) {
            Some(group) => {
                if !group.certificates.iter().any(|c| c.uci() == certificate.uci()) {
                    group.certificates.push(certificate);
                }
            }
            None => groups.push(CertificateGroup {
                id,
                certificates: vec![certificate],
            }),
        }
    }

    groups
}
