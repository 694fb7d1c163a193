//! Durable crawl state store
//!
//! Holds the in-memory mirror of `failed_urls.json` and `progress.json` and
//! writes each file through on every mutation.

use crate::state::progress::ProgressCursor;
use crate::state::status::{StatusKind, StoredEntry, UrlStatus};
use crate::storage::{self, StorageResult};
use crate::url::Level;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// File holding terminal URL failures, grouped by level
pub const FAILED_URLS_FILE: &str = "failed_urls.json";

/// File holding the progress cursor
pub const PROGRESS_FILE: &str = "progress.json";

type UrlKey = (Level, String);

/// On-disk layout of `failed_urls.json`
#[derive(Debug, Default, Serialize, Deserialize)]
struct FailedUrlsFile {
    #[serde(default)]
    first_level: BTreeMap<String, StoredEntry>,
    #[serde(default)]
    second_level: BTreeMap<String, StoredEntry>,
    #[serde(default)]
    word_level: BTreeMap<String, StoredEntry>,
}

impl FailedUrlsFile {
    fn from_map(map: &HashMap<UrlKey, UrlStatus>) -> Self {
        let mut file = Self::default();
        for ((level, url), status) in map {
            file.level_mut(*level).insert(url.clone(), status.to_stored());
        }
        file
    }

    fn into_map(self) -> HashMap<UrlKey, UrlStatus> {
        let mut map = HashMap::new();
        for (level, entries) in [
            (Level::First, self.first_level),
            (Level::Second, self.second_level),
            (Level::Word, self.word_level),
        ] {
            for (url, entry) in entries {
                map.insert(
                    (level, url.clone()),
                    UrlStatus::from_stored(level, url, entry),
                );
            }
        }
        map
    }

    fn level_mut(&mut self, level: Level) -> &mut BTreeMap<String, StoredEntry> {
        match level {
            Level::First => &mut self.first_level,
            Level::Second => &mut self.second_level,
            Level::Word => &mut self.word_level,
        }
    }
}

/// Persistent record of failed URLs and crawl progress
///
/// Mutations are serialized by a writer lock held across the in-memory change
/// and the file write, so the file on disk always reflects the latest
/// completed call. Readers only take the map locks briefly and never wait on
/// file I/O.
#[derive(Debug)]
pub struct CrawlStateStore {
    dir: PathBuf,
    writer: Mutex<()>,
    urls: RwLock<HashMap<UrlKey, UrlStatus>>,
    progress: RwLock<ProgressCursor>,
}

impl CrawlStateStore {
    /// Opens the store in `dir`, loading existing state or initializing it
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStateStore)` - State loaded (or freshly initialized)
    /// * `Err(StorageError)` - The directory could not be created or a state
    ///   file exists but cannot be parsed
    pub fn open(dir: &Path) -> StorageResult<Self> {
        storage::ensure_dir(dir)?;
        Self::load(dir)
    }

    /// Loads whatever state exists in `dir` without creating anything
    ///
    /// A missing directory reads as empty state. Used by the inspection
    /// commands; mutating a loaded store still writes into `dir`.
    pub fn load(dir: &Path) -> StorageResult<Self> {
        let urls = storage::read_json::<FailedUrlsFile>(&dir.join(FAILED_URLS_FILE))?
            .unwrap_or_default()
            .into_map();

        let progress = match storage::read_json::<ProgressCursor>(&dir.join(PROGRESS_FILE))? {
            Some(progress) => {
                tracing::info!(
                    "Resuming from progress: letter={:?}, processed={}",
                    progress.current_letter,
                    progress.processed_words
                );
                progress
            }
            None => ProgressCursor::new(),
        };

        tracing::info!(
            "Opened crawl state in {} ({} failed URLs on record)",
            dir.display(),
            urls.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            writer: Mutex::new(()),
            urls: RwLock::new(urls),
            progress: RwLock::new(progress),
        })
    }

    /// Removes the state files in `dir` so the next open starts fresh
    pub fn reset(dir: &Path) -> StorageResult<()> {
        for name in [FAILED_URLS_FILE, PROGRESS_FILE] {
            if storage::remove_if_exists(&dir.join(name))? {
                tracing::info!("Removed {}", dir.join(name).display());
            }
        }
        Ok(())
    }

    /// Directory holding the state files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Records an outcome for `(level, url)` and writes it through
    ///
    /// `Success` removes any stored entry; every other status replaces the
    /// entry with the given retry count and the current time.
    pub fn mark_status(
        &self,
        url: &str,
        level: Level,
        status: StatusKind,
        retry_count: u32,
    ) -> StorageResult<()> {
        let _writer = self.lock_writer();

        let snapshot = {
            let mut urls = write_lock(&self.urls);
            let key = (level, url.to_string());
            if status.is_success() {
                if urls.remove(&key).is_some() {
                    tracing::debug!("Cleared {} status for {}", level, url);
                }
            } else {
                urls.insert(
                    key,
                    UrlStatus {
                        level,
                        url: url.to_string(),
                        status,
                        retry_count,
                        last_update: Utc::now(),
                    },
                );
                tracing::debug!(
                    "Marked {} URL {} as {} (retries: {})",
                    level,
                    url,
                    status,
                    retry_count
                );
            }
            FailedUrlsFile::from_map(&urls)
        };

        storage::write_json_atomic(&self.failed_urls_path(), &snapshot)
    }

    /// Returns the stored entry for `(level, url)`, if any
    ///
    /// `None` means the URL has never failed terminally (or has since
    /// succeeded) and should be attempted.
    pub fn get_status(&self, url: &str, level: Level) -> Option<UrlStatus> {
        read_lock(&self.urls)
            .get(&(level, url.to_string()))
            .cloned()
    }

    /// Merges the given fields into the progress cursor and writes it through
    pub fn update_progress(
        &self,
        letter: Option<&str>,
        processed_words: Option<u64>,
        total_words: Option<u64>,
    ) -> StorageResult<()> {
        let _writer = self.lock_writer();

        let snapshot = {
            let mut progress = write_lock(&self.progress);
            progress.merge(letter, processed_words, total_words);
            progress.clone()
        };

        storage::write_json_atomic(&self.progress_path(), &snapshot)
    }

    /// Increments `processed_words` by one and writes it through
    ///
    /// Returns the new count.
    pub fn record_processed_word(&self) -> StorageResult<u64> {
        let _writer = self.lock_writer();

        let snapshot = {
            let mut progress = write_lock(&self.progress);
            progress.processed_words += 1;
            progress.touch();
            progress.clone()
        };

        storage::write_json_atomic(&self.progress_path(), &snapshot)?;
        Ok(snapshot.processed_words)
    }

    /// Returns a snapshot of the progress cursor
    pub fn get_progress(&self) -> ProgressCursor {
        read_lock(&self.progress).clone()
    }

    /// Returns stored entries ordered by level, then URL
    ///
    /// With `Some(level)` only that level's entries are returned.
    pub fn failed_urls(&self, level: Option<Level>) -> Vec<UrlStatus> {
        let mut entries: Vec<UrlStatus> = read_lock(&self.urls)
            .values()
            .filter(|s| level.map_or(true, |l| s.level == l))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.url.cmp(&b.url)));
        entries
    }

    /// Counts stored entries per level
    pub fn failure_counts(&self) -> BTreeMap<Level, usize> {
        let mut counts = BTreeMap::new();
        for (level, _) in read_lock(&self.urls).keys() {
            *counts.entry(*level).or_insert(0) += 1;
        }
        counts
    }

    /// Writes both state files from the in-memory mirror
    ///
    /// Called during shutdown; every mutation is already written through, so
    /// this only guarantees both files exist and carry a final timestamp.
    pub fn persist(&self) -> StorageResult<()> {
        let _writer = self.lock_writer();

        let urls = FailedUrlsFile::from_map(&read_lock(&self.urls));
        storage::write_json_atomic(&self.failed_urls_path(), &urls)?;

        let progress = {
            let mut progress = write_lock(&self.progress);
            progress.touch();
            progress.clone()
        };
        storage::write_json_atomic(&self.progress_path(), &progress)?;

        tracing::debug!("Persisted crawl state to {}", self.dir.display());
        Ok(())
    }

    fn failed_urls_path(&self) -> PathBuf {
        self.dir.join(FAILED_URLS_FILE)
    }

    fn progress_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// A panic while holding a map lock leaves the map itself consistent (each
// mutation is a single insert/remove), so poisoned locks are recovered.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
