//! In-memory cache store for testing and development.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::error::{CacheError, CacheResult};
use crate::traits::store::{CacheEntry, CacheStore};
use crate::types::fingerprint::Fingerprint;

/// In-memory cache keyed by fingerprint.
///
/// Not suitable for production as data is lost on restart.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,

    /// Simulate a broken backend on save
    fail_saves: AtomicBool,

    saves: AtomicUsize,
}

impl MemoryCache {
    /// Create a new empty memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail with an I/O error.
    pub fn with_failing_saves(self) -> Self {
        self.fail_saves.store(true, Ordering::SeqCst);
        self
    }

    /// Insert an entry directly, bypassing `save`.
    pub fn seed(&self, entry: CacheEntry) {
        self.entries
            .write()
            .unwrap()
            .insert(entry.fingerprint.clone(), entry);
    }

    /// Get the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn load(&self, fingerprint: &Fingerprint) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.read().unwrap().get(fingerprint).cloned())
    }

    async fn save(&self, fingerprint: &Fingerprint, entry: &CacheEntry) -> CacheResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory cache configured to fail",
            )));
        }

        self.entries
            .write()
            .unwrap()
            .insert(fingerprint.clone(), entry.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn purge_before(&self, date: NaiveDate) -> CacheResult<usize> {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.captured_on >= date);
        Ok(before - entries.len())
    }
}
