//! Session-scoped key/value memory with access counters and optional file backing

use super::atomic::{read_json, AtomicFileWriter};
use crate::message::Metadata;
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

type SessionMemory = BTreeMap<String, MemoryEntry>;

/// One stored value and its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Stored value
    pub value: Value,
    /// Caller-supplied annotations
    #[serde(default)]
    pub metadata: Metadata,
    /// First write time
    pub created_at: DateTime<Utc>,
    /// Last read or overwrite
    pub last_accessed: DateTime<Utc>,
    /// Reads through `get`
    #[serde(default)]
    pub access_count: u64,
}

impl MemoryEntry {
    fn new(value: Value, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            value,
            metadata,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryMatch {
    /// Matching key
    pub key: String,
    /// Stored value
    pub value: Value,
    /// Stored annotations
    pub metadata: Metadata,
    /// First write time
    pub created_at: DateTime<Utc>,
}

/// Summary counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    /// Sessions with at least one entry
    pub total_sessions: usize,
    /// Entries across all sessions
    pub total_entries: usize,
    /// Backing file, if any
    pub storage_path: Option<PathBuf>,
}

/// Long-term memory shared by agents across a session's requests.
///
/// With a storage path, the full map is rewritten atomically after every
/// mutation, including reads that bump access counters. Write failures are
/// logged and never surface to callers; the in-memory map stays authoritative.
///
/// The file write is blocking I/O on the calling thread. It runs after the map
/// lock is released, so readers never wait on the disk, but async callers with
/// a slow backing store should move heavy write bursts to `spawn_blocking`.
#[derive(Debug)]
pub struct MemoryBank {
    storage_path: Option<PathBuf>,
    sessions: Mutex<BTreeMap<String, SessionMemory>>,
    // bumped under the map lock; orders snapshots taken by concurrent writers
    revision: AtomicU64,
    // revision of the snapshot currently on disk
    written: Mutex<u64>,
}

impl MemoryBank {
    /// Purely in-memory bank
    pub fn in_memory() -> Self {
        Self {
            storage_path: None,
            sessions: Mutex::new(BTreeMap::new()),
            revision: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    /// Bank backed by a JSON file, loading it when present
    pub fn with_storage(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sessions = Self::load(&path);
        Self {
            storage_path: Some(path),
            sessions: Mutex::new(sessions),
            revision: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    /// Build from an optional storage path
    pub fn new(storage_path: Option<PathBuf>) -> Self {
        match storage_path {
            Some(path) => Self::with_storage(path),
            None => Self::in_memory(),
        }
    }

    fn load(path: &Path) -> BTreeMap<String, SessionMemory> {
        if !path.exists() {
            info!("Memory file {} not found, starting fresh", path.display());
            return BTreeMap::new();
        }
        match read_json(path) {
            Ok(sessions) => {
                info!("Loaded memory from {}", path.display());
                sessions
            }
            Err(e) => {
                warn!("Could not load memory from {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    /// Snapshot the map, release the lock, then write the snapshot.
    ///
    /// A snapshot older than the one already on disk is discarded.
    fn flush(&self, sessions: MutexGuard<'_, BTreeMap<String, SessionMemory>>) {
        let Some(path) = &self.storage_path else {
            return;
        };
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let content = serde_json::to_string_pretty(&*sessions);
        drop(sessions);

        let content = match content {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to serialize memory: {}", e);
                return;
            }
        };
        let mut written = utils::lock(&self.written);
        if *written > revision {
            debug!("Skipping stale memory snapshot {}", revision);
            return;
        }
        match AtomicFileWriter::new(path).and_then(|writer| writer.write_content(&content)) {
            Ok(()) => *written = revision,
            Err(e) => warn!("Failed to save memory to {}: {}", path.display(), e),
        }
    }

    /// Store a value, replacing any previous entry under the same key
    pub fn put(&self, session_id: &str, key: &str, value: Value, metadata: Option<Metadata>) {
        let mut sessions = utils::lock(&self.sessions);
        sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), MemoryEntry::new(value, metadata.unwrap_or_default()));
        debug!("Stored memory: {}/{}", session_id, key);
        self.flush(sessions);
    }

    /// Read a value, counting the access
    pub fn get(&self, session_id: &str, key: &str) -> Option<Value> {
        let mut sessions = utils::lock(&self.sessions);
        let entry = sessions.get_mut(session_id)?.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed = Utc::now();
        let value = entry.value.clone();
        self.flush(sessions);
        Some(value)
    }

    /// Read a value or fall back to `default`
    pub fn get_or(&self, session_id: &str, key: &str, default: Value) -> Value {
        self.get(session_id, key).unwrap_or(default)
    }

    /// Inspect an entry without touching its counters
    pub fn entry(&self, session_id: &str, key: &str) -> Option<MemoryEntry> {
        utils::lock(&self.sessions)
            .get(session_id)
            .and_then(|memory| memory.get(key))
            .cloned()
    }

    /// Snapshot of every value in a session
    pub fn all(&self, session_id: &str) -> BTreeMap<String, Value> {
        utils::lock(&self.sessions)
            .get(session_id)
            .map(|memory| {
                memory
                    .iter()
                    .map(|(k, entry)| (k.clone(), entry.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delete one key, or the whole session when `key` is None
    pub fn delete(&self, session_id: &str, key: Option<&str>) {
        let mut sessions = utils::lock(&self.sessions);
        let removed = match key {
            Some(key) => sessions
                .get_mut(session_id)
                .and_then(|memory| memory.remove(key))
                .is_some(),
            None => sessions.remove(session_id).is_some(),
        };
        if removed {
            debug!("Deleted memory: {}/{}", session_id, key.unwrap_or("*"));
            self.flush(sessions);
        }
    }

    /// Case-insensitive substring search over keys and values
    pub fn search(&self, session_id: &str, query: &str) -> Vec<MemoryMatch> {
        let needle = query.to_lowercase();
        let sessions = utils::lock(&self.sessions);
        let Some(memory) = sessions.get(session_id) else {
            return Vec::new();
        };

        memory
            .iter()
            .filter(|(key, entry)| {
                key.to_lowercase().contains(&needle)
                    || stringify(&entry.value).to_lowercase().contains(&needle)
            })
            .map(|(key, entry)| MemoryMatch {
                key: key.clone(),
                value: entry.value.clone(),
                metadata: entry.metadata.clone(),
                created_at: entry.created_at,
            })
            .collect()
    }

    /// Session and entry counts
    pub fn stats(&self) -> MemoryStats {
        let sessions = utils::lock(&self.sessions);
        MemoryStats {
            total_sessions: sessions.len(),
            total_entries: sessions.values().map(BTreeMap::len).sum(),
            storage_path: self.storage_path.clone(),
        }
    }

    /// Backing file, if any
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }
}

impl Default for MemoryBank {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Strings match on their raw text, everything else on its JSON form
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_round_trip() {
        let bank = MemoryBank::in_memory();
        bank.put("s1", "soil", json!("loamy"), None);

        assert_eq!(bank.get("s1", "soil"), Some(json!("loamy")));
        assert_eq!(bank.get("s1", "missing"), None);
        assert_eq!(bank.get_or("s1", "missing", json!(42)), json!(42));
        assert_eq!(bank.get_or("other", "soil", Value::Null), Value::Null);
    }

    #[test]
    fn test_access_count_only_on_successful_read() {
        let bank = MemoryBank::in_memory();
        bank.put("s", "k", json!(1), None);

        bank.get("s", "k");
        bank.get("s", "k");
        bank.get("s", "nope");
        let _ = bank.all("s");

        let entry = bank.entry("s", "k").unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_accessed >= entry.created_at);
    }

    #[test]
    fn test_overwrite_resets_entry() {
        let bank = MemoryBank::in_memory();
        bank.put("s", "k", json!("old"), None);
        bank.get("s", "k");
        let first = bank.entry("s", "k").unwrap();

        bank.put("s", "k", json!("new"), None);
        let second = bank.entry("s", "k").unwrap();
        assert_eq!(second.value, json!("new"));
        assert_eq!(second.access_count, 0);
        assert!(second.created_at >= first.created_at);
    }

    #[test]
    fn test_delete_key_and_session() {
        let bank = MemoryBank::in_memory();
        bank.put("s", "a", json!(1), None);
        bank.put("s", "b", json!(2), None);

        bank.delete("s", Some("a"));
        assert_eq!(bank.all("s").len(), 1);

        bank.delete("s", None);
        assert!(bank.all("s").is_empty());
        assert_eq!(bank.stats().total_sessions, 0);
    }

    #[test]
    fn test_search_keys_and_values() {
        let bank = MemoryBank::in_memory();
        bank.put("s", "favorite_crop", json!("Rice"), None);
        bank.put("s", "location", json!("Kerala"), None);
        bank.put("s", "yield", json!({"rice_tons": 4}), None);

        let hits: Vec<String> = bank.search("s", "RICE").into_iter().map(|m| m.key).collect();
        assert_eq!(hits, vec!["favorite_crop", "yield"]);

        let hits = bank.search("s", "crop");
        assert_eq!(hits.len(), 1);
        assert!(bank.search("unknown", "rice").is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");

        {
            let bank = MemoryBank::with_storage(&path);
            let mut meta = Metadata::new();
            meta.insert("source".to_string(), json!("user"));
            bank.put("s", "name", json!("Asha"), Some(meta));
            bank.get("s", "name");
        }

        let reloaded = MemoryBank::with_storage(&path);
        let entry = reloaded.entry("s", "name").unwrap();
        assert_eq!(entry.value, json!("Asha"));
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.metadata.get("source"), Some(&json!("user")));
        assert_eq!(reloaded.stats().storage_path, Some(path));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");
        std::fs::write(&path, "{not json").unwrap();

        let bank = MemoryBank::with_storage(&path);
        assert_eq!(bank.stats().total_entries, 0);
        bank.put("s", "k", json!(true), None);
        assert_eq!(bank.get("s", "k"), Some(json!(true)));
    }

    #[test]
    fn test_unwritable_path_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        // a directory where the file should be
        let path = temp_dir.path().join("taken");
        std::fs::create_dir(&path).unwrap();

        let bank = MemoryBank::with_storage(&path);
        bank.put("s", "k", json!(1), None);
        assert_eq!(bank.get("s", "k"), Some(json!(1)));
    }

    #[test]
    fn test_concurrent_writers_persist_latest_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.json");
        let bank = std::sync::Arc::new(MemoryBank::with_storage(&path));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let bank = bank.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        bank.put("shared", &format!("w{}-{}", worker, i), json!(i), None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = MemoryBank::with_storage(&path);
        assert_eq!(reopened.all("shared").len(), 80);
        assert_eq!(reopened.stats().total_entries, 80);
    }
}
