use super::clock::Clock;
use crate::config::CacheSettings;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SECS_PER_DAY: i64 = 86_400;

/// How an entry is addressed inside a namespace.
#[derive(Debug, Clone, Copy)]
pub enum CacheKey<'a> {
    /// A remote identifier, e.g. an MBID.
    Id(&'a str),
    /// Request parameters. Order does not matter; values are used verbatim,
    /// so callers normalize names with [`normalize`] first.
    Params(&'a [(&'a str, &'a str)]),
}

/// Normalization applied to free-text names before they become cache keys.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    data: Value,
    /// Insertion time, unix seconds.
    timestamp: i64,
}

type Namespace = BTreeMap<String, CacheEntry>;

/// Response cache split into namespaces, each persisted to
/// `<dir>/<namespace>.json` and expiring after its own TTL.
///
/// Namespaces are loaded lazily on first access. Persistence failures and
/// corrupt files are logged and never surface to callers.
pub struct TtlCache {
    dir: PathBuf,
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    namespaces: HashMap<String, Namespace>,
}

impl TtlCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {:?}", dir))?;
        Ok(Self {
            dir,
            settings,
            clock,
            namespaces: HashMap::new(),
        })
    }

    pub fn get(&mut self, namespace: &str, key: CacheKey) -> Option<Value> {
        let full_key = self.build_key(namespace, &key);
        let ttl = self.ttl_secs(namespace);
        let now = self.clock.now_secs();

        let entries = self.load_namespace(namespace);
        let expired = is_expired(entries.get(&full_key)?, now, ttl);
        if expired {
            entries.remove(&full_key);
            debug!("Cache entry {} expired", full_key);
            return None;
        }
        entries.get(&full_key).map(|entry| entry.data.clone())
    }

    pub fn put(&mut self, namespace: &str, key: CacheKey, data: Value) {
        let full_key = self.build_key(namespace, &key);
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now_secs(),
        };
        self.load_namespace(namespace).insert(full_key, entry);
        if let Err(e) = self.persist(namespace) {
            warn!("Failed to persist cache namespace {}: {:#}", namespace, e);
        }
    }

    /// Typed [`get`](Self::get). An entry that no longer deserializes is a miss.
    pub fn get_as<T: DeserializeOwned>(&mut self, namespace: &str, key: CacheKey) -> Option<T> {
        let value = self.get(namespace, key)?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Discarding unreadable cache entry in {}: {}", namespace, e);
                None
            }
        }
    }

    pub fn put_as<T: Serialize>(&mut self, namespace: &str, key: CacheKey, data: &T) {
        match serde_json::to_value(data) {
            Ok(value) => self.put(namespace, key, value),
            Err(e) => warn!("Failed to serialize cache entry for {}: {}", namespace, e),
        }
    }

    /// Drops one namespace, or every namespace when `namespace` is `None`,
    /// both in memory and on disk. Returns the number of files removed.
    pub fn clear(&mut self, namespace: Option<&str>) -> Result<usize> {
        let targets = match namespace {
            Some(ns) => vec![ns.to_string()],
            None => self.known_namespaces()?,
        };

        let mut removed = 0;
        for ns in &targets {
            self.namespaces.remove(ns);
            let path = self.namespace_path(ns);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove cache file {:?}", path))?;
                removed += 1;
            }
        }
        if namespace.is_none() {
            self.namespaces.clear();
        }
        info!("Cleared {} cache namespace file(s)", removed);
        Ok(removed)
    }

    /// Live (non-expired) entry count per namespace.
    pub fn stats(&mut self) -> Result<BTreeMap<String, usize>> {
        let now = self.clock.now_secs();
        let mut stats = BTreeMap::new();
        for ns in self.known_namespaces()? {
            let ttl = self.ttl_secs(&ns);
            let live = self
                .load_namespace(&ns)
                .values()
                .filter(|entry| !is_expired(entry, now, ttl))
                .count();
            stats.insert(ns, live);
        }
        Ok(stats)
    }

    pub(crate) fn build_key(&self, namespace: &str, key: &CacheKey) -> String {
        match key {
            CacheKey::Id(id) => format!("{}:id:{}", namespace, id),
            CacheKey::Params(params) => {
                let canonical: BTreeMap<&str, &str> = params.iter().copied().collect();
                let json = serde_json::to_string(&canonical).unwrap_or_default();
                let key = format!("{}:params:{}", namespace, json);
                if key.len() > self.settings.key_hash_threshold {
                    format!("{}:hash:{:x}", namespace, Sha256::digest(json.as_bytes()))
                } else {
                    key
                }
            }
        }
    }

    fn ttl_secs(&self, namespace: &str) -> i64 {
        self.settings.ttl_days(namespace) as i64 * SECS_PER_DAY
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        let file_name: String = namespace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }

    /// Namespaces with a file on disk or entries in memory.
    fn known_namespaces(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.namespaces.keys().cloned().collect();
        let read_dir = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list cache directory {:?}", self.dir))?;
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !names.iter().any(|n| n == stem) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn load_namespace(&mut self, namespace: &str) -> &mut Namespace {
        if !self.namespaces.contains_key(namespace) {
            let loaded = self.read_file(namespace);
            self.namespaces.insert(namespace.to_string(), loaded);
        }
        self.namespaces.entry(namespace.to_string()).or_default()
    }

    /// Reads the namespace file, dropping expired entries. A missing or
    /// corrupt file yields an empty namespace.
    fn read_file(&self, namespace: &str) -> Namespace {
        let path = self.namespace_path(namespace);
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Namespace::new(),
            Err(e) => {
                warn!("Failed to read cache file {:?}: {}", path, e);
                return Namespace::new();
            }
        };

        let mut entries: Namespace = match serde_json::from_slice(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cache file {:?} is corrupt, starting empty: {}", path, e);
                return Namespace::new();
            }
        };

        let now = self.clock.now_secs();
        let ttl = self.ttl_secs(namespace);
        entries.retain(|_, entry| !is_expired(entry, now, ttl));
        entries
    }

    /// Read-modify-write: entries written to the file by someone else since
    /// we loaded it are kept, ours win on conflicting keys.
    fn persist(&mut self, namespace: &str) -> Result<()> {
        let mut merged = self.read_file(namespace);
        if let Some(entries) = self.namespaces.get(namespace) {
            for (key, entry) in entries {
                merged.insert(key.clone(), entry.clone());
            }
        }

        let json = serde_json::to_vec(&merged)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.persist(self.namespace_path(namespace))
            .map_err(|e| e.error)?;

        self.namespaces.insert(namespace.to_string(), merged);
        Ok(())
    }
}

fn is_expired(entry: &CacheEntry, now: i64, ttl_secs: i64) -> bool {
    now - entry.timestamp > ttl_secs
}
