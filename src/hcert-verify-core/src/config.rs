//! Configuration for the verification engine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;
use crate::revocation::RevocationPolicy;

/// Configuration for health certificate verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyConfig {
    /// Scheme prefix stripped from scanned QR text.
    pub qr_prefix: String,
    /// Country whose acceptance rules apply (ISO 3166 alpha-2).
    pub acceptance_country: String,
    /// Optional region within the acceptance country (e.g. a federal state).
    pub region: Option<String>,
    /// Upper bound on the inflated COSE payload.
    pub max_decompressed_size: usize,
    /// Timeout applied to every collaborator call.
    #[serde(with = "duration_secs")]
    pub source_timeout: Duration,
    /// How an unavailable revocation index affects the verdict.
    pub revocation_policy: RevocationPolicy,
    /// Tolerance added to expiry and certificate-validity checks.
    #[serde(with = "duration_secs")]
    pub clock_skew: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            qr_prefix: "HC1:".into(),
            acceptance_country: "DE".into(),
            region: None,
            max_decompressed_size: 64 * 1024,
            source_timeout: Duration::from_secs(30),
            revocation_policy: RevocationPolicy::FailClosed,
            clock_skew: Duration::ZERO,
        }
    }
}

impl VerifyConfig {
    /// Parse a JSON configuration document; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, VerifyError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| VerifyError::config(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, VerifyError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| VerifyError::config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.acceptance_country.trim().len() != 2 {
            return Err(VerifyError::config(format!(
                "acceptance country must be a two-letter code, got {:?}",
                self.acceptance_country
            )));
        }
        if self.max_decompressed_size == 0 {
            return Err(VerifyError::config("max decompressed size must be positive"));
        }
        if self.source_timeout.is_zero() {
            return Err(VerifyError::config("source timeout must be positive"));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
