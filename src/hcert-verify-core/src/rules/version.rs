//! Rule version ordering.

use std::cmp::Ordering;

/// A parsed dot-separated version.
///
/// An unparseable string orders below every parseable one, and two
/// unparseable versions are equal. Missing trailing components count as
/// zero, so `1.0` equals `1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVersion(Option<Vec<u64>>);

impl RuleVersion {
    /// Parse `text`; never fails.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let parts: Option<Vec<u64>> = text
            .trim()
            .split('.')
            .map(|part| part.trim().parse::<u64>().ok())
            .collect();
        Self(parts)
    }

    /// Whether the string was a valid version.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }
}

impl Ord for RuleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => {
                let len = a.len().max(b.len());
                (0..len)
                    .map(|i| {
                        let x = a.get(i).copied().unwrap_or(0);
                        let y = b.get(i).copied().unwrap_or(0);
                        x.cmp(&y)
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            }
        }
    }
}

impl PartialOrd for RuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version strings.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    RuleVersion::parse(a).cmp(&RuleVersion::parse(b))
}
