//! Location snapshot cache.
//!
//! The service reads and writes through [`LocationCache`] so storage can be
//! swapped: [`JsonFileCache`] persists one JSON file per key under the app
//! config dir, [`MemoryLocationCache`] lives only as long as the process.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::types::LocationSnapshot;

/// Storage key for one user's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_user(user_id: &str) -> Self {
        Self(format!("location_snapshot:{}", user_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::for_user("default")
    }
}

pub trait LocationCache: Send + Sync {
    /// Stored snapshot for `key`, expired or not.
    fn get(&self, key: &CacheKey) -> Result<Option<LocationSnapshot>>;

    fn set(&self, key: &CacheKey, snapshot: &LocationSnapshot) -> Result<()>;

    /// Remove the entry; removing a missing entry is not an error.
    fn clear(&self, key: &CacheKey) -> Result<()>;
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryLocationCache {
    entries: Mutex<HashMap<CacheKey, LocationSnapshot>>,
}

impl MemoryLocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl LocationCache for MemoryLocationCache {
    fn get(&self, key: &CacheKey) -> Result<Option<LocationSnapshot>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &CacheKey, snapshot: &LocationSnapshot) -> Result<()> {
        self.entries.lock().insert(key.clone(), snapshot.clone());
        Ok(())
    }

    fn clear(&self, key: &CacheKey) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Persistent cache: `<dir>/<escaped key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    dir: PathBuf,
}

impl JsonFileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key.as_str())))
    }
}

/// Percent-escape anything that isn't safe in a file name on every platform.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out
}

impl LocationCache for JsonFileCache {
    fn get(&self, key: &CacheKey) -> Result<Option<LocationSnapshot>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache entry {}", path.display()))?;
        let snapshot = serde_json::from_str(&json)
            .with_context(|| format!("Corrupt cache entry {}", path.display()))?;
        Ok(Some(snapshot))
    }

    fn set(&self, key: &CacheKey, snapshot: &LocationSnapshot) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("Failed to create cache directory")?;

        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        std::fs::write(&tmp, json).context("Failed to write cache entry")?;
        std::fs::rename(&tmp, &path).context("Failed to replace cache entry")?;

        tracing::debug!("Cached location snapshot at {:?}", path);
        Ok(())
    }

    fn clear(&self, key: &CacheKey) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to delete cache entry")?;
            tracing::debug!("Deleted cache entry {:?}", path);
        }
        Ok(())
    }
}
