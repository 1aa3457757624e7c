//! # hcert-verify-core
//!
//! Offline-first verification of signed digital health certificates
//! (EU DCC style: `HC1:` + Base45 + zlib + COSE_Sign1 + CWT).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  VerificationEngine                          │
//! │                                                              │
//! │  QR text ──▶ codec (Base45, zlib, COSE_Sign1, CWT)           │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │ SignatureValidator ◀── TrustRegistry (snapshot)   │      │
//! │  │   (expiry first, kid lookup, country binding)    │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │ RevocationIndex ◀── RevocationSource              │      │
//! │  │   (kid list → index → byte1/byte2 chunks)        │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │ RulesValidator ◀── RuleRepository + RuleEvaluator │      │
//! │  │   (acceptance + invalidation, highest version)   │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │                 Verdict {Valid, Invalid, Incomplete}         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//!
//! - **Expiry before signature**: expired tokens never reach key lookup
//! - **Country binding**: a key only validates tokens of its own country
//! - **Atomic snapshots**: trust lists and rules are swapped wholesale
//! - **Unavailable is not valid**: revocation outages follow an explicit policy

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod base45;
pub mod cancel;
pub mod cbor;
pub mod certificate;
pub mod codec;
pub mod config;
pub mod cose;
pub mod cwt;
pub mod engine;
pub mod error;
pub mod grouping;
pub mod revocation;
pub mod rules;
pub mod snapshot;
pub mod trust;
pub mod trust_list;
pub mod validator;

pub use cancel::CancellationFlag;
pub use cbor::CborValue;
pub use certificate::{
    CertificateEntry, CertificateType, HealthCertificate, PersonName, Recovery, TestEntry,
    TestResult, Vaccination,
};
pub use codec::{decode_raw_token, encode_raw_token, parse_cose_sign1};
pub use config::VerifyConfig;
pub use cose::{KeyId, SignedToken};
pub use cwt::DecodedClaims;
pub use engine::{decide, RuleReport, VerificationEngine, VerificationReport, Verdict};
pub use error::VerifyError;
pub use grouping::{group_certificates, CertificateGroup, HolderId};
pub use revocation::{
    HashVariant, LocalRevocationStore, RevocationCandidate, RevocationIndex, RevocationOutcome,
    RevocationPolicy, RevocationSource, RevocationSync, SignedListFetcher, SignedListSource,
};
pub use rules::{
    ImmunityStatus, InMemoryRuleRepository, LiteralEvaluator, MaskStatus, Rule, RuleEvaluator,
    RuleIdentifier, RuleRepository, RuleSelector, RuleSource, RuleSync, RuleType, RulesValidator,
    ValidationType,
};
pub use snapshot::Snapshot;
pub use trust::{TrustListSource, TrustRegistry, TrustedCertificate};
pub use trust_list::TrustList;
pub use validator::{SignatureValidator, ValidatedToken};
