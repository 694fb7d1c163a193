//! Crawler-facing side of the harvester
//!
//! The HTTP engine itself lives outside this crate. This module contains
//! everything the engine talks to, including:
//! - The line-delimited event protocol
//! - Retry and terminal-failure decisions for fetch outcomes
//! - Resumption planning for discovered URLs
//! - Overall harvest coordination

mod coordinator;
mod events;
mod resume;
mod retry;

pub use coordinator::{
    run_event_stream, run_harvest, Coordinator, ExtractionReport, HarvestSummary,
};
pub use events::{encode_decision, parse_event, Decision, EngineEvent};
pub use resume::{resume_from_letter, should_dispatch, ResumePolicy};
pub use retry::{
    FetchError, FetchOutcome, RetryCoordinator, RetryDecision, RetryPolicy,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_HTTP_CODES,
};

use crate::config::Config;
use crate::HarvestError;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncWrite};

/// Runs a complete harvest over an engine event stream
///
/// This is the main entry point for a run. It will:
/// 1. Load the crawl state and existing output
/// 2. Answer each engine event in order
/// 3. Flush all output and persist state when the stream ends or
///    `shutdown` resolves
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `events` - Line-delimited engine events
/// * `decisions` - Where answers are written, one per event
/// * `shutdown` - Resolves when the run should stop early
pub async fn harvest<R, W, S>(
    config: &Config,
    events: R,
    decisions: W,
    shutdown: S,
) -> Result<HarvestSummary, HarvestError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    run_harvest(config, events, decisions, shutdown).await
}
