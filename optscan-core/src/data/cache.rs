//! Same-day JSON cache for slow-moving scraped values.
//!
//! Layout: `{cache_dir}/{name}.json`, a map of key → `{value, updated_at}`.
//! Entries not written today are discarded on load, so dividend yields and
//! the risk-free rate are scraped at most once per day per key.
//!
//! Writes are atomic (write to .tmp, rename into place). An empty cache
//! removes its file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: f64,
    pub updated_at: NaiveDate,
}

pub struct DailyCache {
    path: PathBuf,
    today: NaiveDate,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl DailyCache {
    /// Open `{cache_dir}/{name}.json`, keeping only entries dated `today`.
    ///
    /// A missing or unreadable file starts an empty cache.
    pub fn open(cache_dir: &Path, name: &str, today: NaiveDate) -> Self {
        let path = cache_dir.join(format!("{name}.json"));
        let entries: BTreeMap<String, CacheEntry> = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring unreadable cache: {e}");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        let entries = entries
            .into_iter()
            .filter(|(_, e)| e.updated_at == today)
            .collect();

        Self {
            path,
            today,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.lock().unwrap().get(key).map(|e| e.value)
    }

    pub fn insert(&self, key: &str, value: f64) {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            CacheEntry {
                value,
                updated_at: self.today,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the cache to disk.
    pub fn persist(&self) -> Result<(), CacheError> {
        let entries = self.entries.lock().unwrap().clone();

        if entries.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|source| CacheError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(&entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|source| CacheError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::Io {
                path: self.path.clone(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn persisted_entries_reload_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyCache::open(dir.path(), "yields", day(3));
        cache.insert("KO", 0.031);
        cache.persist().unwrap();

        let reloaded = DailyCache::open(dir.path(), "yields", day(3));
        assert_eq!(reloaded.get("KO"), Some(0.031));
    }

    #[test]
    fn stale_entries_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyCache::open(dir.path(), "yields", day(3));
        cache.insert("KO", 0.031);
        cache.persist().unwrap();

        let next_day = DailyCache::open(dir.path(), "yields", day(4));
        assert!(next_day.get("KO").is_none());
        assert!(next_day.is_empty());
    }

    #[test]
    fn empty_cache_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyCache::open(dir.path(), "rates", day(3));
        cache.insert("risk_free_rate", 0.042);
        cache.persist().unwrap();
        assert!(cache.path().exists());

        let stale = DailyCache::open(dir.path(), "rates", day(9));
        stale.persist().unwrap();
        assert!(!stale.path().exists());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("yields.json"), "{not json").unwrap();
        let cache = DailyCache::open(dir.path(), "yields", day(3));
        assert!(cache.is_empty());
    }
}
