//! Persistent queue of events awaiting network delivery
//!
//! Each undelivered event is one JSON file under the queue directory.
//! Files are written under a hidden temporary name and renamed into place,
//! so a concurrent scan only ever sees complete records.

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::payload::{Payload, generate_id};

const PENDING_EXTENSION: &str = "json";

/// What is stored in a pending file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub id: String,
    pub url: String,
    pub method: String,
    pub enqueued_at: DateTime<Utc>,
    pub payload: Payload,
}

/// Reference to one persisted item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingFile {
    id: String,
    path: PathBuf,
}

impl PendingFile {
    fn from_path(path: PathBuf) -> Option<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some(PENDING_EXTENSION) {
            return None;
        }
        let id = path.file_stem()?.to_str()?.to_string();
        if id.starts_with('.') {
            return None;
        }
        Some(Self { id, path })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record from disk
    ///
    /// Always reads the current file content; nothing is cached.
    pub fn load(&self) -> Result<PendingRecord> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read pending file: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pending file: {}", self.path.display()))
    }
}

/// Directory-backed queue of undelivered events
#[derive(Debug, Clone)]
pub struct PendingQueue {
    dir: PathBuf,
}

impl PendingQueue {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default location under the system temp directory
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("fanlog").join("pending")
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Persist a payload and its destination
    pub fn enqueue(&self, payload: &Payload, url: &str, method: &str) -> Result<PendingFile> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create queue directory: {}", self.dir.display()))?;

        let record = PendingRecord {
            id: generate_id(),
            url: url.to_string(),
            method: method.to_string(),
            enqueued_at: Utc::now(),
            payload: payload.clone(),
        };
        let json = serde_json::to_vec(&record).context("Failed to serialize pending record")?;

        let mut staged = tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(&self.dir)
            .context("Failed to create staging file")?;
        staged.write_all(&json).context("Failed to write pending record")?;
        staged.as_file().sync_all().context("Failed to sync pending record")?;

        let path = self.dir.join(format!("{}.{}", record.id, PENDING_EXTENSION));
        staged
            .persist_noclobber(&path)
            .with_context(|| format!("Failed to move pending record into place: {}", path.display()))?;

        log::debug!("Enqueued pending event {} for {} {}", record.id, method, url);
        Ok(PendingFile { id: record.id, path })
    }

    /// Scan the directory for pending items
    ///
    /// Each call rescans; order is whatever the filesystem returns.
    pub fn pending_items(&self) -> impl Iterator<Item = PendingFile> + use<> {
        WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| PendingFile::from_path(entry.into_path()))
    }

    /// Delete an item; already-removed items are fine
    pub fn remove(&self, item: &PendingFile) -> Result<()> {
        match fs::remove_file(&item.path) {
            Ok(()) => {
                log::debug!("Removed pending event {}", item.id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove pending file: {}", item.path.display())),
        }
    }

    /// Delete every pending item, returning how many were removed
    pub fn purge(&self) -> Result<usize> {
        let mut removed = 0;
        for item in self.pending_items() {
            self.remove(&item)?;
            removed += 1;
        }
        log::info!("Purged {} pending event(s) from {}", removed, self.dir.display());
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.pending_items().count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_items().next().is_none()
    }
}
