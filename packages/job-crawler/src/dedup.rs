//! Link-keyed deduplication of job records.
//!
//! Records are grouped by [`normalize_link`]. Within a group the first record
//! seen is kept and each of its empty fields is filled from the first later
//! duplicate that has a value. A field is only ever filled once, so merging is
//! idempotent and the set of filled fields does not depend on input order.

use std::collections::BTreeMap;
use url::Url;

use crate::types::job::JobRecord;

/// Query parameters that only track where a click came from.
const TRACKING_PARAMS: &[&str] = &[
    "utm", "fbclid", "gclid", "mc_cid", "mc_eid", "ref", "ref_src", "source", "trk",
];

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

/// Canonical grouping key for a link.
///
/// Case-folded, without fragment, trailing slash or tracking parameters; the
/// remaining query parameters are sorted.
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_lowercase();
    };

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    params.sort();

    url.set_fragment(None);
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params);
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);

    let mut key = url.to_string();
    // An empty path still renders as "/" on hierarchical URLs.
    if url.query().is_none() {
        key = key.trim_end_matches('/').to_string();
    }
    key.to_lowercase()
}

/// A deduplicated, link-ordered record collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSet {
    records: BTreeMap<String, JobRecord>,
    merged: usize,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record, merging it into an existing record with the same key.
    /// Returns `true` if the record was new.
    pub fn insert(&mut self, record: JobRecord) -> bool {
        let key = normalize_link(&record.link);
        match self.records.get_mut(&key) {
            Some(existing) => {
                existing.fill_from(&record);
                self.merged += 1;
                false
            }
            None => {
                self.records.insert(key, record);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of input records folded into an earlier one.
    pub fn duplicates_merged(&self) -> usize {
        self.merged
    }

    pub fn get(&self, link: &str) -> Option<&JobRecord> {
        self.records.get(&normalize_link(link))
    }

    pub fn contains_link(&self, link: &str) -> bool {
        self.get(link).is_some()
    }

    /// Records in normalized-link order.
    pub fn iter(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.values()
    }

    /// Normalized keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn into_records(self) -> Vec<JobRecord> {
        self.records.into_values().collect()
    }
}

impl Extend<JobRecord> for JobSet {
    fn extend<I: IntoIterator<Item = JobRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl FromIterator<JobRecord> for JobSet {
    fn from_iter<I: IntoIterator<Item = JobRecord>>(iter: I) -> Self {
        let mut set = JobSet::new();
        set.extend(iter);
        set
    }
}

/// Merge records into a deduplicated set. Earlier records take precedence.
pub fn merge(records: impl IntoIterator<Item = JobRecord>) -> JobSet {
    records.into_iter().collect()
}
