//! PR -> chat message index
//!
//! Remembers which chat message currently represents each pull request so a
//! later event updates that card instead of posting a new one.
//!
//! ## Storage model
//!
//! The index is an ordered log of `(key, message_id)` pairs, oldest first,
//! capped at `max_entries`. Recording a key removes any older pair for the
//! same key before appending, and the oldest pairs are dropped once the cap
//! is exceeded. In practice a chat only has a handful of open PRs at a time,
//! so the cap only evicts PRs nobody is touching anymore. A miss is not an
//! error: the relay simply posts a new card.
//!
//! The whole log is rewritten (atomically) on every `record`. Write
//! failures are reported to the caller but the in-memory log keeps the new
//! pair for the rest of the process lifetime.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::file::{ensure_parent, read_json, write_json_atomic};

/// On-disk shape: `{"mapping": [["owner/repo#7", "om_xxx"], ...]}`
#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingFile {
    #[serde(default)]
    mapping: Vec<(String, String)>,
}

/// Bounded, file-backed index from `(repo, pr_number)` to chat message id
#[derive(Clone)]
pub struct MessageIndex {
    /// Path to the JSON file
    path: PathBuf,
    /// Ordered log, oldest first
    log: Arc<Mutex<Vec<(String, String)>>>,
    /// Maximum number of pairs kept
    max_entries: usize,
}

impl MessageIndex {
    /// Open the index at `path`, loading any existing log.
    ///
    /// A missing, blank or unreadable file starts an empty index. Only a
    /// failure to create the parent directory is an error.
    pub async fn open(path: impl Into<PathBuf>, max_entries: usize) -> StoreResult<Self> {
        let path = path.into();
        let max_entries = max_entries.max(1);

        ensure_parent(&path).await?;

        let mut log = match read_json::<MappingFile>(&path).await {
            Ok(Some(file)) => file.mapping,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Ignoring unreadable message map: {}", e);
                Vec::new()
            }
        };

        let trimmed = trim_oldest(&mut log, max_entries);

        let index = Self {
            path,
            log: Arc::new(Mutex::new(log)),
            max_entries,
        };

        // A file written under a larger cap is rewritten right away
        if trimmed > 0 {
            let log = index.log.lock().await;
            if let Err(e) = index.persist(&log).await {
                warn!("Failed to rewrite trimmed message map: {}", e);
            }
        }

        Ok(index)
    }

    /// Key used in the log for a pull request
    pub fn key(repo: &str, pr_number: u64) -> String {
        format!("{}#{}", repo, pr_number)
    }

    /// Message id currently representing the PR, newest entry first
    pub async fn lookup(&self, repo: &str, pr_number: u64) -> Option<String> {
        let key = Self::key(repo, pr_number);
        let log = self.log.lock().await;
        log.iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }

    /// Point the PR at `message_id` and persist the log.
    ///
    /// The in-memory log is updated even when the write fails; the error is
    /// returned so the caller can surface it.
    pub async fn record(&self, repo: &str, pr_number: u64, message_id: &str) -> StoreResult<()> {
        let key = Self::key(repo, pr_number);
        let mut log = self.log.lock().await;

        log.retain(|(k, _)| *k != key);
        log.push((key.clone(), message_id.to_string()));
        let evicted = trim_oldest(&mut log, self.max_entries);
        if evicted > 0 {
            debug!("Evicted {} stale message mappings", evicted);
        }

        debug!("Recorded {} -> {}", key, message_id);
        self.persist(&log).await
    }

    async fn persist(&self, log: &[(String, String)]) -> StoreResult<()> {
        let file = MappingFile {
            mapping: log.to_vec(),
        };
        write_json_atomic(&self.path, &file).await
    }

    /// Snapshot of the log, oldest first
    pub async fn entries(&self) -> Vec<(String, String)> {
        self.log.lock().await.clone()
    }

    /// Get the number of entries
    pub async fn len(&self) -> usize {
        self.log.lock().await.len()
    }

    /// Check if empty
    pub async fn is_empty(&self) -> bool {
        self.log.lock().await.is_empty()
    }

    /// Get the file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Get the maximum entries limit
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

/// Drop the oldest pairs until at most `max` remain; returns how many were dropped
fn trim_oldest(log: &mut Vec<(String, String)>, max: usize) -> usize {
    if log.len() <= max {
        return 0;
    }
    let excess = log.len() - max;
    log.drain(..excess);
    excess
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_and_lookup() {
        let dir = tempdir().unwrap();
        let index = MessageIndex::open(dir.path().join("map"), 50).await.unwrap();

        assert!(index.lookup("a/b", 7).await.is_none());
        index.record("a/b", 7, "om_1").await.unwrap();
        assert_eq!(index.lookup("a/b", 7).await.as_deref(), Some("om_1"));
        assert!(index.lookup("a/b", 8).await.is_none());
        assert!(index.lookup("a/c", 7).await.is_none());
    }

    #[tokio::test]
    async fn test_record_replaces_existing_key() {
        let dir = tempdir().unwrap();
        let index = MessageIndex::open(dir.path().join("map"), 50).await.unwrap();

        index.record("a/b", 7, "om_1").await.unwrap();
        index.record("a/b", 9, "om_2").await.unwrap();
        index.record("a/b", 7, "om_3").await.unwrap();

        assert_eq!(index.len().await, 2);
        assert_eq!(index.lookup("a/b", 7).await.as_deref(), Some("om_3"));
        // re-recorded key moves to the newest position
        let entries = index.entries().await;
        assert_eq!(entries.last().unwrap().0, "a/b#7");
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let dir = tempdir().unwrap();
        let index = MessageIndex::open(dir.path().join("map"), 2).await.unwrap();

        index.record("a/b", 1, "om_1").await.unwrap();
        index.record("a/b", 2, "om_2").await.unwrap();
        index.record("a/b", 3, "om_3").await.unwrap();

        assert_eq!(index.len().await, 2);
        assert!(index.lookup("a/b", 1).await.is_none());
        assert_eq!(index.lookup("a/b", 2).await.as_deref(), Some("om_2"));
        assert_eq!(index.lookup("a/b", 3).await.as_deref(), Some("om_3"));
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map");

        {
            let index = MessageIndex::open(&path, 50).await.unwrap();
            index.record("a/b", 7, "om_1").await.unwrap();
        }

        let index = MessageIndex::open(&path, 50).await.unwrap();
        assert_eq!(index.lookup("a/b", 7).await.as_deref(), Some("om_1"));
    }

    #[tokio::test]
    async fn test_file_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map");
        let index = MessageIndex::open(&path, 50).await.unwrap();
        index.record("a/b", 7, "om_1").await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"mapping": [["a/b#7", "om_1"]]}));
    }

    #[tokio::test]
    async fn test_load_applies_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map");
        std::fs::write(
            &path,
            r#"{"mapping": [["a/b#1","om_1"],["a/b#2","om_2"],["a/b#3","om_3"]]}"#,
        )
        .unwrap();

        let index = MessageIndex::open(&path, 2).await.unwrap();
        assert_eq!(index.len().await, 2);
        assert!(index.lookup("a/b", 1).await.is_none());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("om_1"));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map");
        std::fs::write(&path, "garbage").unwrap();

        let index = MessageIndex::open(&path, 50).await.unwrap();
        assert!(index.is_empty().await);
        index.record("a/b", 1, "om_1").await.unwrap();
        assert_eq!(index.lookup("a/b", 1).await.as_deref(), Some("om_1"));
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state/map");

        let index = MessageIndex::open(&path, 50).await.unwrap();
        index.record("a/b", 1, "om_1").await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map");
        let index = MessageIndex::open(&path, 50).await.unwrap();

        // A directory in the way of the temp file makes the write fail
        std::fs::create_dir(dir.path().join("map.tmp")).unwrap();

        let result = index.record("a/b", 7, "om_1").await;
        assert!(result.is_err());
        assert_eq!(index.lookup("a/b", 7).await.as_deref(), Some("om_1"));
    }
}
