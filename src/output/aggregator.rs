//! Sharded, buffered record output
//!
//! Accepted records are grouped by their `letter` field into one buffer per
//! shard. Buffers are flushed on a cadence while the crawl runs and all of
//! them are flushed, together with `stats.json`, when the aggregator closes.

use crate::output::shard::ShardBuffer;
use crate::output::stats::{AggregateStats, STATS_FILE};
use crate::output::traits::{Admission, OutputError, OutputResult};
use crate::output::validation::validate;
use crate::storage::{self, StorageResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of records between periodic flushes
pub const DEFAULT_FLUSH_EVERY: u64 = 100;

/// When a shard is written out before close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlushPolicy {
    /// Every `flush-every`-th record of the run flushes the shard that record
    /// belongs to. Other shards wait for their own boundary hit or for close.
    #[default]
    Global,

    /// A shard is flushed once it holds `flush-every` unflushed records.
    PerShard,
}

#[derive(Debug, Default)]
struct Counters {
    stats: AggregateStats,
    run_items: u64,
}

/// Buffers accepted records per shard and flushes them to `data_dir`
#[derive(Debug)]
pub struct OutputAggregator {
    data_dir: PathBuf,
    flush_every: u64,
    policy: FlushPolicy,
    shards: Mutex<HashMap<String, Arc<Mutex<ShardBuffer>>>>,
    counters: Mutex<Counters>,
    closed: AtomicBool,
}

impl OutputAggregator {
    /// Opens an aggregator writing into `data_dir`
    ///
    /// Existing statistics are loaded so counts keep accumulating across runs,
    /// matching the append behavior of the shard files. Shard files themselves
    /// are loaded lazily on first use.
    pub fn open(data_dir: &Path, flush_every: u64, policy: FlushPolicy) -> StorageResult<Self> {
        storage::ensure_dir(data_dir)?;
        let stats: AggregateStats =
            storage::read_json(&data_dir.join(STATS_FILE))?.unwrap_or_default();

        tracing::info!(
            "Opened output in {} ({} items from earlier runs, flush every {} records, {:?} policy)",
            data_dir.display(),
            stats.total_items,
            flush_every,
            policy
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            flush_every: flush_every.max(1),
            policy,
            shards: Mutex::new(HashMap::new()),
            counters: Mutex::new(Counters {
                stats,
                run_items: 0,
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Validates a record and, if accepted, buffers it into its shard
    ///
    /// # Returns
    ///
    /// * `Ok(Admission::Accepted)` - The record was counted and buffered
    /// * `Ok(Admission::Rejected)` - Validation failed; nothing changed
    /// * `Err(OutputError)` - Loading or flushing the shard failed, or the
    ///   aggregator is already closed
    pub fn process(&self, record: Value) -> OutputResult<Admission> {
        let shard_key = match validate(&record) {
            Ok(key) => key,
            Err(reason) => {
                tracing::warn!("Dropping record: {}", reason);
                return Ok(Admission::Rejected(reason));
            }
        };

        let shard = self.shard(&shard_key)?;
        let mut buffer = lock(&shard);
        // close() may have passed over this buffer between shard() and here
        if self.closed.load(Ordering::Acquire) {
            return Err(OutputError::Closed);
        }
        buffer.ensure_loaded()?;

        let run_total = {
            let mut counters = lock(&self.counters);
            counters.stats.record(&shard_key);
            counters.run_items += 1;
            counters.run_items
        };

        buffer.append(record);

        let flush_due = match self.policy {
            FlushPolicy::Global => run_total % self.flush_every == 0,
            FlushPolicy::PerShard => buffer.unflushed() >= self.flush_every,
        };
        if flush_due {
            buffer.flush()?;
        }

        Ok(Admission::Accepted {
            shard: shard_key,
            run_total,
            flushed: flush_due,
        })
    }

    /// Flushes every shard with unwritten records and writes `stats.json`
    ///
    /// Further calls to [`process`](Self::process) fail with
    /// [`OutputError::Closed`], including calls already in flight that have
    /// not yet locked their shard.
    pub fn close(&self) -> OutputResult<AggregateStats> {
        self.closed.store(true, Ordering::Release);

        let shards: Vec<Arc<Mutex<ShardBuffer>>> = lock(&self.shards).values().cloned().collect();

        let mut flushed = 0;
        let mut records = 0;
        for shard in shards {
            let mut buffer = lock(&shard);
            // A buffer whose load failed never received records; writing it
            // would clobber the file it could not read.
            if !buffer.is_loaded() || !buffer.is_dirty() {
                continue;
            }
            buffer.flush()?;
            flushed += 1;
            records += buffer.len();
        }

        let stats = self.stats();
        storage::write_json_atomic(&self.data_dir.join(STATS_FILE), &stats)?;

        tracing::info!(
            "Closed output: flushed {} shards ({} records), {} items total",
            flushed,
            records,
            stats.total_items
        );
        Ok(stats)
    }

    /// Snapshot of the aggregate statistics
    pub fn stats(&self) -> AggregateStats {
        lock(&self.counters).stats.clone()
    }

    /// Returns the buffer for `shard_key`, creating it unless closed
    fn shard(&self, shard_key: &str) -> OutputResult<Arc<Mutex<ShardBuffer>>> {
        let mut shards = lock(&self.shards);
        if self.closed.load(Ordering::Acquire) {
            return Err(OutputError::Closed);
        }
        Ok(Arc::clone(
            shards
                .entry(shard_key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ShardBuffer::new(&self.data_dir, shard_key)))),
        ))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
