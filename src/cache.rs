//! Extraction result cache — one JSON file per listing URL.
//!
//! Keyed by a stable FNV-1a hash of the URL. The file's mtime is the
//! staleness clock: entries older than the TTL are treated as misses and
//! left on disk to be overwritten by the next successful extraction. Only
//! successful extractions are persisted, so failed URLs are retried on
//! every batch.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Cached cascade output for one listing URL. Logo bytes are not cached —
/// only the discovered URL, re-fetched on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedListing {
    pub name: String,
    pub developer: String,
    pub logo_url: Option<String>,
    pub success: bool,
    pub fetched_at: DateTime<Utc>,
}

/// Filesystem-backed cache of extraction results.
pub struct MetadataCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl MetadataCache {
    /// Open (creating if needed) a cache rooted at `cache_dir`.
    pub fn new(cache_dir: PathBuf, ttl: Duration) -> Result<Self> {
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;
        Ok(Self { cache_dir, ttl })
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        let mut hasher = FnvHasher::default();
        hasher.write(url.as_bytes());
        self.cache_dir.join(format!("cache_{:016x}.json", hasher.finish()))
    }

    fn is_fresh(&self, path: &Path) -> bool {
        let Ok(meta) = fs::metadata(path) else {
            return false;
        };
        let Ok(mtime) = meta.modified() else {
            return false;
        };
        SystemTime::now()
            .duration_since(mtime)
            .map(|age| age < self.ttl)
            .unwrap_or(false)
    }

    /// Fetch a fresh, parseable entry for `url`, if one exists.
    ///
    /// A stale or corrupt file is a miss, never an error.
    pub fn get(&self, url: &str) -> Option<CachedListing> {
        let path = self.entry_path(url);
        if !self.is_fresh(&path) {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(body) => match serde_json::from_str::<CachedListing>(&body) {
                Ok(entry) => {
                    tracing::debug!(url, path = %path.display(), "cache hit");
                    Some(entry)
                }
                Err(e) => {
                    tracing::warn!(url, error = %e, "discarding corrupt cache entry");
                    None
                }
            },
            Err(_) => None,
        }
    }

    /// Persist a successful extraction. Failures are never written, so the
    /// next batch retries the URL. Returns the written path, or `None` when
    /// the entry was skipped.
    pub fn put(&self, url: &str, entry: &CachedListing) -> Result<Option<PathBuf>> {
        if !entry.success {
            tracing::debug!(url, "not caching unsuccessful extraction");
            return Ok(None);
        }
        let path = self.entry_path(url);
        let body = serde_json::to_string_pretty(entry)?;
        fs::write(&path, body)
            .with_context(|| format!("failed to write cache entry: {}", path.display()))?;
        Ok(Some(path))
    }

    /// Remove every cache file. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir)
            .with_context(|| format!("failed to read cache dir: {}", self.cache_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                fs::remove_file(&path).ok();
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
