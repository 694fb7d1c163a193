//! Storage module for persisting crawl data
//!
//! Every durable artifact of a harvest (crawl state, progress cursor, shard
//! files and aggregate stats) is a pretty-printed JSON document that is
//! rewritten in full on each save. This module owns the two primitives the
//! rest of the crate builds on:
//! - `write_json_atomic`: replace a file without ever exposing a truncated one
//! - `read_json`: load a file if it exists, failing loudly if it is corrupt

mod traits;

pub use traits::{StorageError, StorageResult};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ensures a directory (and its parents) exists
pub fn ensure_dir(dir: &Path) -> StorageResult<()> {
    fs::create_dir_all(dir).map_err(|source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// Returns the sibling path used while a file is being replaced
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serializes `value` and atomically replaces the file at `path`
///
/// The document is written to `<path>.tmp`, synced, and renamed over the
/// target, so a crash mid-write leaves either the old or the new contents.
///
/// # Arguments
///
/// * `path` - Destination file
/// * `value` - Any serializable value
///
/// # Returns
///
/// * `Ok(())` - The new contents are durable
/// * `Err(StorageError)` - Serialization or I/O failed; the target is untouched
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = temp_path_for(path);
    let io_err = |source| StorageError::Io {
        path: tmp_path.clone(),
        source,
    };

    let mut file = File::create(&tmp_path).map_err(io_err)?;
    file.write_all(&json).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }

    fs::rename(&tmp_path, path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::trace!("Wrote {} ({} bytes)", path.display(), json.len());
    Ok(())
}

/// Reads and deserializes a JSON file if it exists
///
/// # Returns
///
/// * `Ok(None)` - The file does not exist
/// * `Ok(Some(T))` - The file was parsed
/// * `Err(StorageError::Corrupt)` - The file exists but does not parse
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let content = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|source| StorageError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Removes a file, treating a missing file as already removed
pub fn remove_if_exists(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
