//! Cache store trait for memoized per-source results.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheResult;
use crate::types::{fingerprint::Fingerprint, job::JobRecord};

/// A memoized result for one source under one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,

    /// Calendar date the records were fetched
    pub captured_on: NaiveDate,

    pub records: Vec<JobRecord>,

    /// When the entry was written
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(fingerprint: Fingerprint, captured_on: NaiveDate, records: Vec<JobRecord>) -> Self {
        Self {
            fingerprint,
            captured_on,
            records,
            written_at: Utc::now(),
        }
    }

    /// An entry may be consumed only when both its fingerprint and its
    /// capture date match the current run exactly.
    pub fn is_valid_for(&self, fingerprint: &Fingerprint, today: NaiveDate) -> bool {
        self.fingerprint == *fingerprint && self.captured_on == today
    }
}

/// Fingerprint-keyed persistence for [`CacheEntry`] values.
///
/// Implementations must make `save` atomic per key: a concurrent `load`
/// sees either the previous entry or the new one, never a mix. Two saves to
/// the same key resolve as last-writer-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load the entry stored under a fingerprint.
    async fn load(&self, fingerprint: &Fingerprint) -> CacheResult<Option<CacheEntry>>;

    /// Store an entry under a fingerprint, replacing any previous one.
    async fn save(&self, fingerprint: &Fingerprint, entry: &CacheEntry) -> CacheResult<()>;

    /// Remove entries captured before `date`. Returns how many were removed.
    async fn purge_before(&self, _date: NaiveDate) -> CacheResult<usize> {
        Ok(0)
    }
}
