//! Cache fingerprints.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::types::job::JobSource;

/// Opaque digest of the configuration that produced a cached result.
///
/// Two fingerprints are equal only if keyword set, source, schema version and
/// calendar date are all equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for one source under the given configuration.
    pub fn compute(
        keywords: &BTreeSet<String>,
        source: JobSource,
        schema_version: &str,
        date: NaiveDate,
    ) -> Self {
        FingerprintInput {
            keywords: keywords.iter().map(|k| normalize_keyword(k)).collect(),
            source: source.id(),
            schema_version,
            date: date.format("%Y-%m-%d").to_string(),
        }
        .digest()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form hashed into a [`Fingerprint`].
#[derive(Serialize)]
struct FingerprintInput<'a> {
    keywords: BTreeSet<String>,
    source: &'a str,
    schema_version: &'a str,
    date: String,
}

impl FingerprintInput<'_> {
    fn digest(&self) -> Fingerprint {
        // Struct fields serialize in declaration order and the keyword set is sorted,
        // so the encoding is canonical.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

fn normalize_keyword(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}
