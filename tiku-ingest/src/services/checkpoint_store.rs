//! Checkpoint store
//!
//! The persisted map from work-item key to accepted value: a single flat
//! pretty-printed JSON object, loaded once at startup, mutated in memory and
//! flushed back whole. Reloading and re-scanning is always safe, which is
//! the entire recovery story; there is no other durable state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Checkpoint store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The checkpoint file exists but is not a flat string-to-string object
    #[error("Malformed checkpoint {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Flat key → accepted-value store backed by one JSON file
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    /// Upserts since the last flush
    pending: usize,
    /// Flush after this many upserts; 1 = flush on every acceptance
    flush_every: usize,
}

impl CheckpointStore {
    /// Load the store from disk. An absent file is an empty store.
    pub fn load(path: impl Into<PathBuf>, flush_every: usize) -> Result<Self, StoreError> {
        let path = path.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => {
                serde_json::from_str::<BTreeMap<String, String>>(&content).map_err(|e| {
                    StoreError::Malformed {
                        path: path.clone(),
                        message: e.to_string(),
                    }
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            "Checkpoint store loaded"
        );

        Ok(Self {
            path,
            entries,
            pending: 0,
            flush_every: flush_every.max(1),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace one accepted value, flushing when the batch
    /// threshold is reached
    pub fn upsert(&mut self, key: String, value: String) -> Result<(), StoreError> {
        self.entries.insert(key, value);
        self.pending += 1;
        if self.pending >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the whole map to disk, pretty-printed, via tmp-file + rename
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(&self.entries).map_err(|e| {
            StoreError::Malformed {
                path: self.path.clone(),
                message: e.to_string(),
            }
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "Checkpoint store flushed"
        );

        self.pending = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
