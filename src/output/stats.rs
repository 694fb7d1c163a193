//! Aggregate output statistics
//!
//! This module provides the counters persisted as `stats.json` and the
//! functions that load and display them.

use crate::state::ProgressCursor;
use crate::storage::{self, StorageResult};
use crate::url::Level;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File holding aggregate statistics inside the data directory
pub const STATS_FILE: &str = "stats.json";

/// Counts of accepted records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Total number of accepted records
    #[serde(default)]
    pub total_items: u64,

    /// Accepted records per shard key
    #[serde(default)]
    pub items_by_letter: BTreeMap<String, u64>,
}

impl AggregateStats {
    /// Counts one accepted record for `shard`
    pub fn record(&mut self, shard: &str) {
        self.total_items += 1;
        *self.items_by_letter.entry(shard.to_string()).or_insert(0) += 1;
    }

    /// Returns true if the per-shard counts add up to the total
    pub fn is_consistent(&self) -> bool {
        self.items_by_letter.values().sum::<u64>() == self.total_items
    }
}

/// Loads statistics from `<data_dir>/stats.json`
///
/// # Returns
///
/// * `Ok(AggregateStats)` - Loaded statistics, or empty ones if the file is absent
/// * `Err(StorageError)` - The file exists but could not be read or parsed
pub fn load_statistics(data_dir: &Path) -> StorageResult<AggregateStats> {
    Ok(storage::read_json(&data_dir.join(STATS_FILE))?.unwrap_or_default())
}

/// Prints output statistics to stdout in a formatted manner
pub fn print_statistics(stats: &AggregateStats) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Total items: {}", stats.total_items);
    println!("  Shards: {}", stats.items_by_letter.len());
    println!();

    if !stats.items_by_letter.is_empty() {
        println!("Items by Letter:");
        // Sort shards by count (descending)
        let mut shard_counts: Vec<_> = stats.items_by_letter.iter().collect();
        shard_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (shard, count) in shard_counts {
            let percentage = if stats.total_items > 0 {
                (*count as f64 / stats.total_items as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", shard, count, percentage);
        }
        println!();
    }

    if !stats.is_consistent() {
        println!("Warning: per-letter counts do not add up to the total");
    }
}

/// Prints the progress cursor and failure counts to stdout
pub fn print_progress(progress: &ProgressCursor, failures: &BTreeMap<Level, usize>) {
    println!("=== Crawl Progress ===\n");

    println!(
        "  Current letter: {}",
        progress.current_letter.as_deref().unwrap_or("(none)")
    );
    match progress.completion() {
        Some(fraction) => println!(
            "  Words processed: {} / {} ({:.1}%)",
            progress.processed_words,
            progress.total_words,
            fraction * 100.0
        ),
        None => println!("  Words processed: {}", progress.processed_words),
    }
    println!("  Started: {}", progress.start_time.to_rfc3339());
    println!("  Last update: {}", progress.last_update.to_rfc3339());
    println!();

    println!("Failed URLs:");
    for level in Level::all() {
        println!(
            "  {}: {}",
            level,
            failures.get(&level).copied().unwrap_or(0)
        );
    }
}
