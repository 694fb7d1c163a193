//! Output module for aggregating extracted records
//!
//! This module handles:
//! - Validating records before they are counted
//! - Buffering accepted records into per-letter shard files
//! - Periodic and final flushing of shard buffers
//! - Recording and displaying aggregate statistics

mod aggregator;
mod shard;
pub mod stats;
mod traits;
mod validation;

pub use aggregator::{FlushPolicy, OutputAggregator, DEFAULT_FLUSH_EVERY};
pub use shard::{shard_path, ShardBuffer};
pub use stats::{load_statistics, print_progress, print_statistics, AggregateStats, STATS_FILE};
pub use traits::{Admission, OutputError, OutputResult};
pub use validation::{validate, ValidationError, RESERVED_SHARDS, SHARD_FIELD, WORD_FIELD};
