// src/cache.rs
//! Decision cache: persisted `(fingerprint, model version) -> ScoreResult`.
//!
//! Entries never expire on their own. Changing the interest-model version changes every
//! key, which is the only invalidation. `prune_older_than` is manual maintenance.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::CacheCorruptionError;
use crate::model::{Fingerprint, ScoreResult};

pub const DEFAULT_CACHE_DIR: &str = ".cache/llm_decisions";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: Fingerprint,
    pub model_version: String,
}

impl CacheKey {
    pub fn new(fingerprint: Fingerprint, model_version: impl Into<String>) -> Self {
        Self {
            fingerprint,
            model_version: model_version.into(),
        }
    }

    /// Hex SHA-256 of `fingerprint|version`; used as the file name.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.model_version.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Concurrent key-value store for semantic decisions. Writes to one key are idempotent
/// and each write must be atomic.
pub trait DecisionStore: Send + Sync {
    /// `Ok(None)` on a miss, `Err` when an entry exists but cannot be read back.
    fn get(&self, key: &CacheKey) -> Result<Option<ScoreResult>, CacheCorruptionError>;
    fn put(&self, key: &CacheKey, value: &ScoreResult) -> io::Result<()>;
}

/// On-disk entry. Key parts are stored so a read can verify what it got.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: String,
    model_version: String,
    cached_at: DateTime<Utc>,
    result: ScoreResult,
}

/// One compact JSON file per key.
#[derive(Debug, Clone)]
pub struct FileDecisionStore {
    dir: PathBuf,
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

impl FileDecisionStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.digest()))
    }

    /// Remove entries cached more than `days` days ago. Unreadable files are left alone.
    pub fn prune_older_than(&self, days: u32) -> io::Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(parsed) = serde_json::from_str::<CacheEntry>(&raw) else {
                continue;
            };
            if parsed.cached_at < cutoff {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        tracing::info!(target: "scoring", removed, days, dir = %self.dir.display(), "pruned decision cache");
        Ok(removed)
    }

    fn write_entry(&self, key: &CacheKey, entry: &CacheEntry) -> io::Result<()> {
        let path = self.path_for(key);
        // Unique per writer so concurrent puts of one key never share a temp file.
        let tmp = self.dir.join(format!(
            "{}.{}.{}.tmp",
            key.digest(),
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let json = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let write = || -> io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write().inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}

impl DecisionStore for FileDecisionStore {
    fn get(&self, key: &CacheKey) -> Result<Option<ScoreResult>, CacheCorruptionError> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheCorruptionError {
                    key: key.digest(),
                    reason: e.to_string(),
                })
            }
        };
        let entry: CacheEntry = serde_json::from_str(&raw).map_err(|e| CacheCorruptionError {
            key: key.digest(),
            reason: e.to_string(),
        })?;
        if entry.fingerprint != key.fingerprint.as_str() || entry.model_version != key.model_version {
            return Err(CacheCorruptionError {
                key: key.digest(),
                reason: "entry belongs to a different key".to_string(),
            });
        }
        Ok(Some(entry.result))
    }

    fn put(&self, key: &CacheKey, value: &ScoreResult) -> io::Result<()> {
        let entry = CacheEntry {
            fingerprint: key.fingerprint.as_str().to_string(),
            model_version: key.model_version.clone(),
            cached_at: Utc::now(),
            result: value.clone(),
        };
        self.write_entry(key, &entry)
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDecisionStore {
    entries: Mutex<HashMap<CacheKey, ScoreResult>>,
}

impl MemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionStore for MemoryDecisionStore {
    fn get(&self, key: &CacheKey) -> Result<Option<ScoreResult>, CacheCorruptionError> {
        let map = self.entries.lock().map_err(|e| CacheCorruptionError {
            key: key.digest(),
            reason: e.to_string(),
        })?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, value: &ScoreResult) -> io::Result<()> {
        let mut map = self
            .entries
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        map.insert(key.clone(), value.clone());
        Ok(())
    }
}
