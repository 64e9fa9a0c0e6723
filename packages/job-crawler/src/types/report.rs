//! Run reports handed to output sinks alongside the record set.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::FetchErrorKind;
use crate::types::job::JobSource;

/// Outcome of one source within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Every keyword stream ran to completion (or the cache was served).
    Success,
    /// Some keyword streams failed, others completed.
    Partial,
    /// No keyword stream completed, or the source reported a fatal error.
    Failed,
}

/// Counts of absorbed record- and page-level problems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTally {
    /// Entries dropped because they could not be normalized
    pub records_skipped: usize,
    /// Pages skipped after a parse error
    pub pages_skipped: usize,
    /// Attempts that ended in a retryable error and were retried
    pub retries: usize,
    /// Challenges detected (resolved or not)
    pub challenges: usize,
    /// Posting pages that could not be read; their records keep the result card's fields
    #[serde(default)]
    pub details_skipped: usize,
}

/// Per-source entry of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: JobSource,
    pub status: SourceStatus,

    /// Records this source contributed before cross-source dedup
    pub record_count: usize,

    pub last_error_kind: Option<FetchErrorKind>,

    /// Served from the cache without fetching
    pub cache_hit: bool,

    /// Fresh result written through to the cache
    pub cache_written: bool,

    pub pages_fetched: usize,

    pub keywords_completed: usize,

    pub keywords_failed: usize,

    /// Posting pages read for fields the result page lacks
    #[serde(default)]
    pub details_fetched: usize,

    #[serde(default)]
    pub errors: ErrorTally,
}

impl SourceReport {
    pub fn new(source: JobSource) -> Self {
        Self {
            source,
            status: SourceStatus::Success,
            record_count: 0,
            last_error_kind: None,
            cache_hit: false,
            cache_written: false,
            pages_fetched: 0,
            keywords_completed: 0,
            keywords_failed: 0,
            details_fetched: 0,
            errors: ErrorTally::default(),
        }
    }

    /// A report for a source served entirely from the cache.
    pub fn from_cache(source: JobSource, record_count: usize) -> Self {
        Self {
            record_count,
            cache_hit: true,
            ..Self::new(source)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SourceStatus::Success
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Per-source outcomes, in configured source order
    pub sources: Vec<SourceReport>,

    /// Records in the final deduplicated set
    pub total_records: usize,

    /// Records removed by cross-source dedup
    pub duplicates_merged: usize,

    /// The run stopped early on an external cancellation or timeout
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(run_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::now_v7(),
            run_date,
            started_at: now,
            finished_at: now,
            sources: Vec::new(),
            total_records: 0,
            duplicates_merged: 0,
            cancelled: false,
        }
    }

    pub fn source(&self, source: JobSource) -> Option<&SourceReport> {
        self.sources.iter().find(|r| r.source == source)
    }

    pub fn status_of(&self, source: JobSource) -> Option<SourceStatus> {
        self.source(source).map(|r| r.status)
    }

    /// Number of sources per status.
    pub fn status_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for report in &self.sources {
            let key = match report.status {
                SourceStatus::Success => "success",
                SourceStatus::Partial => "partial",
                SourceStatus::Failed => "failed",
            };
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// Check if every source succeeded.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.sources.iter().all(SourceReport::is_success)
    }
}
