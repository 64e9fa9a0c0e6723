//! File-backed cache store.
//!
//! Each entry lives in `<dir>/<fingerprint>.json`. Saves write a temporary
//! file next to the target and rename it into place, so readers never see a
//! half-written entry. Saves to the same fingerprint are serialized in-process.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CacheResult;
use crate::traits::store::{CacheEntry, CacheStore};
use crate::types::fingerprint::Fingerprint;

const EXTENSION: &str = "json";

/// JSON-file cache under a directory.
pub struct FileCache {
    dir: PathBuf,

    /// One write guard per fingerprint
    write_locks: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl FileCache {
    /// Open a cache rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding a fingerprint's entry.
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{}", fingerprint.as_str(), EXTENSION))
    }

    async fn lock_for(&self, fingerprint: &Fingerprint) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn load(&self, fingerprint: &Fingerprint) -> CacheResult<Option<CacheEntry>> {
        let path = self.path_for(fingerprint);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = serde_json::from_slice(&bytes)?;
        Ok(Some(entry))
    }

    async fn save(&self, fingerprint: &Fingerprint, entry: &CacheEntry) -> CacheResult<()> {
        let lock = self.lock_for(fingerprint).await;
        let _guard = lock.lock().await;

        let target = self.path_for(fingerprint);
        let temp = self.dir.join(format!(
            ".{}.{}.tmp",
            fingerprint.as_str(),
            uuid::Uuid::new_v4().simple()
        ));

        let bytes = serde_json::to_vec_pretty(entry)?;
        tokio::fs::write(&temp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(
            fingerprint = %fingerprint.short(),
            records = entry.records.len(),
            path = %target.display(),
            "Cache entry written"
        );
        Ok(())
    }

    async fn purge_before(&self, date: NaiveDate) -> CacheResult<usize> {
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }

            let stale = match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                    Ok(entry) => entry.captured_on < date,
                    // Unreadable entries can never be served again.
                    Err(_) => true,
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache file");
                    false
                }
            };

            if stale {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}
