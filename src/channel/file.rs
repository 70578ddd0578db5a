//! Append-only JSONL file channel

use eyre::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::Channel;
use crate::payload::Payload;

/// Appends one JSON line per event to a file
pub struct FileChannel {
    path: PathBuf,
    // Serializes appends from concurrent workers so lines never interleave
    lock: Mutex<()>,
}

impl FileChannel {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Channel for FileChannel {
    fn log(&self, payload: &Payload) -> Result<()> {
        let json = payload.to_json().context("Failed to serialize event")?;

        let _guard = self.lock.lock().map_err(|_| eyre::eyre!("File channel lock poisoned"))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open event log: {}", self.path.display()))?;

        writeln!(file, "{}", json).context("Failed to write event")?;
        Ok(())
    }
}
