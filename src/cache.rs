//! Process-wide `(host, port) -> (server_id, public_key)` cache for the
//! login fast path (§4.E's "cached-server fast path").
//!
//! Grounded on `original_source/core/cache.py`, which kept the same table
//! pickled to disk; this crate already stands on `serde_json` for every
//! other persisted structure; so the cache file is JSON.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedServer {
    pub server_id: String,
    pub public_key: Vec<u8>,
}

/// Keyed by `"host:port"` (not a tuple key: JSON object keys must be
/// strings, and this is the cache's on-disk shape too).
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    servers: HashMap<String, CachedServer>,
}

fn key_for(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// A coarse-locked, optionally-persisted cache shared across sessions.
/// Mirrors the corpus's own `Mutex`-around-shared-state idiom rather than
/// reaching for a concurrent map crate for a table this rarely written to.
pub struct ServerCache {
    inner: Mutex<HashMap<String, CachedServer>>,
}

impl ServerCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Loads a previously-persisted cache, or starts empty if none exists.
    pub fn load_from(path: &Path) -> TetsuResult<Self> {
        match fs::read(path) {
            Ok(bytes) => {
                let parsed: CacheFile = serde_json::from_slice(&bytes)?;
                Ok(Self {
                    inner: Mutex::new(parsed.servers),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, host: &str, port: u16) -> Option<CachedServer> {
        self.inner.lock().unwrap().get(&key_for(host, port)).cloned()
    }

    /// Inserts or overwrites the cached entry; a value that differs from
    /// what later arrives on the wire invalidates itself naturally since
    /// the caller always re-inserts on every encryption-request it sees.
    pub fn put(&self, host: &str, port: u16, server: CachedServer) {
        self.inner
            .lock()
            .unwrap()
            .insert(key_for(host, port), server);
    }

    /// Atomically rewrites the cache file (write-temp-then-rename) so a
    /// crash mid-write never leaves a truncated cache behind.
    pub fn persist_to(&self, path: &Path) -> TetsuResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = CacheFile {
            servers: self.inner.lock().unwrap().clone(),
        };
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(&snapshot)?)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl Default for ServerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Default cache file location: `<cache_dir>/vitrum/cache.json`.
pub fn default_cache_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "vitrum")
        .map(|dirs| dirs.cache_dir().join("cache.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = ServerCache::new();
        cache.put(
            "mc.example.com",
            25565,
            CachedServer {
                server_id: "abc".into(),
                public_key: vec![1, 2, 3],
            },
        );
        let got = cache.get("mc.example.com", 25565).unwrap();
        assert_eq!(got.server_id, "abc");
    }

    #[test]
    fn distinct_ports_are_distinct_keys() {
        let cache = ServerCache::new();
        cache.put("host", 1, CachedServer { server_id: "a".into(), public_key: vec![] });
        cache.put("host", 2, CachedServer { server_id: "b".into(), public_key: vec![] });
        assert_eq!(cache.get("host", 1).unwrap().server_id, "a");
        assert_eq!(cache.get("host", 2).unwrap().server_id, "b");
    }

    #[test]
    fn persists_and_reloads() {
        let path = std::env::temp_dir().join("vitrum-cache-test-persist.json");
        let _ = fs::remove_file(&path);

        let cache = ServerCache::new();
        cache.put("h", 1, CachedServer { server_id: "x".into(), public_key: vec![9] });
        cache.persist_to(&path).unwrap();

        let reloaded = ServerCache::load_from(&path).unwrap();
        assert_eq!(reloaded.get("h", 1).unwrap().server_id, "x");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_loads_empty() {
        let path = std::env::temp_dir().join("vitrum-cache-test-missing.json");
        let _ = fs::remove_file(&path);
        let cache = ServerCache::load_from(&path).unwrap();
        assert!(cache.get("h", 1).is_none());
    }
}
