//! Output error types and per-record results

use crate::output::validation::ValidationError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during output operations
///
/// A rejected record is not an error; see [`Admission::Rejected`].
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Output aggregator is closed")]
    Closed,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// What happened to a record handed to the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The record was buffered into `shard`
    Accepted {
        /// Shard the record was routed to
        shard: String,
        /// Accepted records so far in this run, including this one
        run_total: u64,
        /// Whether this record triggered a flush of its shard
        flushed: bool,
    },

    /// The record failed validation and was dropped
    Rejected(ValidationError),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}
