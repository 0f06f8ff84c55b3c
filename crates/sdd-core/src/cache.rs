//! Parsed-spec cache keyed by path and invalidated by modification time.
//!
//! Least-recently-used entries are evicted at capacity. The cache can be
//! persisted to `.sdd/cache.json`; the last writer wins.

use crate::error::Result;
use crate::paths;
use crate::spec::Spec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    mtime_ns: u64,
    spec: Spec,
    last_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedEntry {
    path: PathBuf,
    mtime_ns: u64,
    spec: Spec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    capacity: usize,
    /// Least recently used first.
    entries: Vec<PersistedEntry>,
}

#[derive(Debug, Clone)]
pub struct SpecCache {
    capacity: usize,
    entries: HashMap<PathBuf, Entry>,
    tick: u64,
    stats: CacheStats,
}

impl Default for SpecCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SpecCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            tick: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Return the parsed spec at `path`, re-parsing when the file changed
    /// since it was cached.
    pub fn get(&mut self, root: &Path, path: &Path) -> Result<Spec> {
        let mtime_ns = file_mtime_ns(path)?;
        self.tick += 1;
        if let Some(entry) = self.entries.get_mut(path) {
            if entry.mtime_ns == mtime_ns {
                entry.last_used = self.tick;
                self.stats.hits += 1;
                return Ok(entry.spec.clone());
            }
        }

        self.stats.misses += 1;
        tracing::debug!(path = %path.display(), "spec cache miss");
        let spec = Spec::load_path(root, path)?;
        self.insert(path.to_path_buf(), mtime_ns, spec.clone());
        Ok(spec)
    }

    fn insert(&mut self, path: PathBuf, mtime_ns: u64, spec: Spec) {
        if !self.entries.contains_key(&path) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            path,
            Entry {
                mtime_ns,
                spec,
                last_used: self.tick,
            },
        );
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(p, _)| p.clone());
        if let Some(path) = oldest {
            self.entries.remove(&path);
            self.stats.evictions += 1;
        }
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn to_json(&self) -> Result<String> {
        let mut ordered: Vec<(&PathBuf, &Entry)> = self.entries.iter().collect();
        ordered.sort_by_key(|(_, e)| e.last_used);
        let file = CacheFile {
            capacity: self.capacity,
            entries: ordered
                .into_iter()
                .map(|(path, e)| PersistedEntry {
                    path: path.clone(),
                    mtime_ns: e.mtime_ns,
                    spec: e.spec.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let file: CacheFile = serde_json::from_str(data)?;
        let mut cache = Self::new(file.capacity);
        for entry in file.entries {
            cache.tick += 1;
            cache.insert(entry.path, entry.mtime_ns, entry.spec);
        }
        Ok(cache)
    }

    /// Read `.sdd/cache.json`; a missing or unreadable file yields an empty
    /// cache.
    pub fn load(root: &Path) -> Self {
        let path = paths::cache_path(root);
        match crate::io::read_optional(&path) {
            Ok(Some(data)) => Self::from_json(&data).unwrap_or_else(|e| {
                tracing::warn!("discarding corrupt spec cache: {e}");
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("cannot read spec cache: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = self.to_json()?;
        crate::io::atomic_write(&paths::cache_path(root), data.as_bytes())
    }
}

fn file_mtime_ns(path: &Path) -> Result<u64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write_spec(root: &Path, id: &str, title: &str) -> PathBuf {
        let path = paths::spec_file(root, id);
        let body = format!("---\nstatus: draft\n---\n# {title}\n\nThe system SHALL work.\n");
        crate::io::atomic_write(&path, body.as_bytes()).unwrap();
        path
    }

    fn touch(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn hit_after_miss() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(dir.path(), "auth", "Auth");
        let mut cache = SpecCache::new(4);
        assert_eq!(cache.get(dir.path(), &path).unwrap().title, "Auth");
        assert_eq!(cache.get(dir.path(), &path).unwrap().id, "auth");
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn changed_mtime_reparses() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(dir.path(), "auth", "Auth");
        touch(&path, 1_000);
        let mut cache = SpecCache::new(4);
        cache.get(dir.path(), &path).unwrap();

        write_spec(dir.path(), "auth", "Auth v2");
        touch(&path, 2_000);
        assert_eq!(cache.get(dir.path(), &path).unwrap().title, "Auth v2");
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn evicts_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let a = write_spec(dir.path(), "a", "A");
        let b = write_spec(dir.path(), "b", "B");
        let c = write_spec(dir.path(), "c", "C");
        let mut cache = SpecCache::new(2);
        cache.get(dir.path(), &a).unwrap();
        cache.get(dir.path(), &b).unwrap();
        cache.get(dir.path(), &a).unwrap();
        cache.get(dir.path(), &c).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        assert!(!cache.invalidate(&b));
        assert!(cache.invalidate(&a));
    }

    #[test]
    fn json_roundtrip_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let a = write_spec(dir.path(), "a", "A");
        let mut cache = SpecCache::new(8);
        cache.get(dir.path(), &a).unwrap();

        let restored = SpecCache::from_json(&cache.to_json().unwrap()).unwrap();
        assert_eq!(restored.len(), 1);
        let mut restored = restored;
        restored.get(dir.path(), &a).unwrap();
        assert_eq!(restored.stats().hits, 1);
    }

    #[test]
    fn load_tolerates_corrupt_file() {
        let dir = TempDir::new().unwrap();
        crate::io::atomic_write(&paths::cache_path(dir.path()), b"{not json").unwrap();
        assert!(SpecCache::load(dir.path()).is_empty());
    }
}
