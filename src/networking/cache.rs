use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

const CACHE_FILE: &str = "checksums.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct CacheEntry {
    size: u64,
    sha256: String,
}

/// Remembers asset digests across runs, keyed by download URL and size.
///
/// A lookup whose size differs from the recorded one drops the entry, so a
/// re-uploaded asset is always hashed again.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChecksumCache {
    entries: BTreeMap<String, CacheEntry>,
    #[serde(skip)]
    dirty: bool,
}

impl ChecksumCache {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(CACHE_FILE)
    }

    /// Load the cache file, starting empty when it is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!("cache: failed to read {}: {err}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_slice::<ChecksumCache>(&bytes) {
            Ok(cache) => {
                debug!(
                    "cache: loaded {} checksum(s) from {}",
                    cache.entries.len(),
                    path.display()
                );
                cache
            }
            Err(err) => {
                warn!("cache: ignoring corrupt {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Persist the cache if anything changed since it was loaded.
    pub fn save(&mut self, path: &Path) -> Result<(), String> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("failed to create cache dir: {e}"))?;
        }
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| format!("failed to serialize checksum cache: {e}"))?;
        fs::write(path, bytes).map_err(|e| format!("failed to write checksum cache: {e}"))?;
        self.dirty = false;
        Ok(())
    }

    pub fn get(&mut self, url: &str, size: u64) -> Option<String> {
        let entry = self.entries.get(url)?;
        if entry.size != size {
            debug!("cache: size changed for {url}, invalidating");
            self.invalidate(url);
            return None;
        }
        Some(entry.sha256.clone())
    }

    pub fn insert(&mut self, url: &str, size: u64, sha256: &str) {
        let entry = CacheEntry {
            size,
            sha256: sha256.to_string(),
        };
        if self.entries.get(url) != Some(&entry) {
            self.entries.insert(url.to_string(), entry);
            self.dirty = true;
        }
    }

    pub fn invalidate(&mut self, url: &str) {
        if self.entries.remove(url).is_some() {
            self.dirty = true;
        }
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
