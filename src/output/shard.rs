//! In-memory buffer for one shard file

use crate::storage::{self, StorageResult};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Buffered records destined for `<data-dir>/<shard_key>.json`
///
/// The buffer always holds the full record list for its shard, so a flush
/// rewrites the whole file rather than appending a delta. Existing file
/// contents are loaded before the first append of a run.
#[derive(Debug)]
pub struct ShardBuffer {
    shard_key: String,
    path: PathBuf,
    records: Vec<Value>,
    loaded: bool,
    dirty: bool,
    unflushed: u64,
}

impl ShardBuffer {
    /// Creates an unloaded buffer for `shard_key` inside `data_dir`
    pub fn new(data_dir: &Path, shard_key: &str) -> Self {
        Self {
            shard_key: shard_key.to_string(),
            path: shard_path(data_dir, shard_key),
            records: Vec::new(),
            loaded: false,
            dirty: false,
            unflushed: 0,
        }
    }

    /// Loads existing records from disk on first use
    ///
    /// A shard file that exists but does not parse is an error; it is never
    /// silently replaced.
    pub fn ensure_loaded(&mut self) -> StorageResult<()> {
        if self.loaded {
            return Ok(());
        }

        if let Some(existing) = storage::read_json::<Vec<Value>>(&self.path)? {
            tracing::debug!(
                "Loaded {} existing records for shard '{}'",
                existing.len(),
                self.shard_key
            );
            self.records = existing;
        }
        self.loaded = true;
        Ok(())
    }

    pub fn append(&mut self, record: Value) {
        self.records.push(record);
        self.dirty = true;
        self.unflushed += 1;
    }

    /// Writes the full record list to the shard file
    pub fn flush(&mut self) -> StorageResult<()> {
        storage::write_json_atomic(&self.path, &self.records)?;
        tracing::debug!(
            "Flushed shard '{}' ({} records)",
            self.shard_key,
            self.records.len()
        );
        self.dirty = false;
        self.unflushed = 0;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Records appended since the last flush
    pub fn unflushed(&self) -> u64 {
        self.unflushed
    }
}

/// Path of the file backing `shard_key`
pub fn shard_path(data_dir: &Path, shard_key: &str) -> PathBuf {
    data_dir.join(format!("{}.json", shard_key))
}
