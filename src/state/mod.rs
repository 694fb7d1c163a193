//! State module for tracking crawl progress
//!
//! This module provides the durable crawl state that makes a harvest
//! resumable.
//!
//! # Components
//!
//! - `StatusKind` / `UrlStatus`: terminal outcomes recorded per `(level, url)`
//! - `ProgressCursor`: letter cursor and word counters for the current run
//! - `CrawlStateStore`: owns both and writes every mutation through to disk

mod progress;
mod status;
mod store;

// Re-export main types
pub use progress::ProgressCursor;
pub use status::{StatusKind, UrlStatus};
pub use store::{CrawlStateStore, FAILED_URLS_FILE, PROGRESS_FILE};
