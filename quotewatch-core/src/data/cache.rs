//! On-disk cache of raw provider responses.
//!
//! Layouts, selected by `CachePolicy`:
//! - `symbol`: `{cache_dir}/{SYMBOL}.json`, one slot per symbol, TTL in minutes
//! - `daily`:  `{cache_dir}/symbol={SYMBOL}/{YYYY-MM-DD}.json`, one slot per
//!   UTC calendar day, TTL in days; reads return the newest day
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Reads never fail: I/O errors are a miss
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Explicit `created_at` in each entry, so freshness follows the injected
//!   clock rather than file mtimes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::provider::{ProviderKind, RawResponse};
use crate::domain::Symbol;

/// Cache bucket granularity and freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "bucket", rename_all = "snake_case")]
pub enum CachePolicy {
    /// One slot per symbol, reused until the TTL runs out.
    Symbol { ttl_minutes: u64 },
    /// One slot per symbol per calendar day.
    Daily { ttl_days: u64 },
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Symbol { ttl_minutes: 29 }
    }
}

impl CachePolicy {
    pub fn ttl(&self) -> chrono::Duration {
        match *self {
            CachePolicy::Symbol { ttl_minutes } => minutes(ttl_minutes),
            CachePolicy::Daily { ttl_days } => minutes(ttl_days.saturating_mul(24 * 60)),
        }
    }
}

fn minutes(n: u64) -> chrono::Duration {
    chrono::Duration::minutes(i64::try_from(n).unwrap_or(i64::MAX / 60_000))
}

/// A persisted raw response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub symbol: Symbol,
    pub provider: ProviderKind,
    pub created_at: DateTime<Utc>,
    pub body: String,
}

impl CacheEntry {
    pub fn new(symbol: Symbol, raw: RawResponse, created_at: DateTime<Utc>) -> Self {
        Self {
            symbol,
            provider: raw.provider,
            created_at,
            body: raw.body,
        }
    }
}

/// `now - created_at < ttl`. An entry from the future (clock skew) is fresh
/// only while that difference stays under the TTL as well.
pub fn is_fresh(entry: &CacheEntry, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
    now - entry.created_at < ttl
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create cache dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("atomic rename to {path} failed: {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One row of `status()`.
#[derive(Debug, Clone)]
pub struct CacheStatus {
    pub symbol: Symbol,
    pub path: Option<PathBuf>,
    pub created_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
}

/// The quote cache.
#[derive(Debug, Clone)]
pub struct QuoteCache {
    cache_dir: PathBuf,
    policy: CachePolicy,
}

impl QuoteCache {
    pub fn new(cache_dir: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            policy,
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Directory for daily buckets: `{cache_dir}/symbol={SYMBOL}/`
    fn symbol_dir(&self, symbol: &Symbol) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    /// Path of the slot an entry created at `at` belongs to.
    pub fn entry_path(&self, symbol: &Symbol, at: DateTime<Utc>) -> PathBuf {
        match self.policy {
            CachePolicy::Symbol { .. } => self.cache_dir.join(format!("{symbol}.json")),
            CachePolicy::Daily { .. } => self
                .symbol_dir(symbol)
                .join(format!("{}.json", at.date_naive().format("%Y-%m-%d"))),
        }
    }

    /// Path of the slot `read` would look at, if any exists.
    fn current_path(&self, symbol: &Symbol) -> Option<PathBuf> {
        match self.policy {
            CachePolicy::Symbol { .. } => {
                let path = self.cache_dir.join(format!("{symbol}.json"));
                path.exists().then_some(path)
            }
            CachePolicy::Daily { .. } => newest_daily_bucket(&self.symbol_dir(symbol)),
        }
    }

    /// Latest entry for a symbol, without TTL validation. Never fails.
    pub fn read(&self, symbol: &Symbol) -> Option<CacheEntry> {
        let path = self.current_path(symbol)?;
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(%symbol, path = %path.display(), error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if entry.symbol == *symbol => Some(entry),
            Ok(entry) => {
                warn!(%symbol, found = %entry.symbol, path = %path.display(), "cache entry belongs to another symbol");
                None
            }
            Err(e) => {
                let quarantine = quarantine_path(&path);
                warn!(
                    %symbol,
                    path = %path.display(),
                    error = %e,
                    "quarantining corrupt cache file"
                );
                let _ = fs::rename(&path, &quarantine);
                None
            }
        }
    }

    /// Persist an entry atomically: readers see the previous entry or the new
    /// one, never a partial file.
    pub fn write(&self, entry: &CacheEntry) -> Result<PathBuf, CacheError> {
        let path = self.entry_path(&entry.symbol, entry.created_at);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_vec_pretty(entry)?;
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, json).map_err(|source| CacheError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|source| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            CacheError::Rename {
                path: path.clone(),
                source,
            }
        })?;

        debug!(symbol = %entry.symbol, path = %path.display(), "cache entry written");
        Ok(path)
    }

    /// Current slot per symbol with its creation time and size.
    pub fn status(&self, symbols: &[Symbol]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|symbol| {
                let path = self.current_path(symbol);
                let size_bytes = path
                    .as_ref()
                    .and_then(|p| fs::metadata(p).ok())
                    .map(|m| m.len())
                    .unwrap_or(0);
                CacheStatus {
                    symbol: symbol.clone(),
                    created_at: self.read(symbol).map(|e| e.created_at),
                    path,
                    size_bytes,
                }
            })
            .collect()
    }

    /// Remove entries created before `cutoff`, plus leftover temp and
    /// quarantined files.
    ///
    /// With `dry_run` nothing is deleted. Returns the affected paths.
    pub fn clean(&self, cutoff: DateTime<Utc>, dry_run: bool) -> std::io::Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(removed);
        }

        let mut candidates = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                for inner in fs::read_dir(&path)? {
                    candidates.push(inner?.path());
                }
            } else {
                candidates.push(path);
            }
        }

        for path in candidates {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let stale = if name.ends_with(".json.tmp") || name.ends_with(".quarantined") {
                true
            } else if name.ends_with(".json") {
                fs::read_to_string(&path)
                    .ok()
                    .and_then(|c| serde_json::from_str::<CacheEntry>(&c).ok())
                    .map_or(false, |e| e.created_at < cutoff)
            } else {
                false
            };

            if stale {
                if !dry_run {
                    fs::remove_file(&path)?;
                }
                removed.push(path);
            }
        }

        Ok(removed)
    }
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".quarantined");
    path.with_file_name(name)
}

/// Newest `{YYYY-MM-DD}.json` in a daily bucket directory.
fn newest_daily_bucket(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            if path.extension()?.to_str()? != "json" {
                return None;
            }
            let date = NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()?;
            Some((date, path))
        })
        .max_by_key(|(date, _)| *date)
        .map(|(_, path)| path)
}
