//! Harvest coordinator - routes crawl engine events through the core
//!
//! This module contains the session object that owns the crawl state store
//! and the output aggregator for the lifetime of a run, including:
//! - Opening both from disk at startup
//! - Filtering discovered URLs for dispatch (resumption)
//! - Turning fetch outcomes into retry/terminal decisions
//! - Feeding extracted records through validation and aggregation
//! - Draining everything to disk on shutdown or interrupt

use crate::config::Config;
use crate::crawler::events::{encode_decision, parse_event, Decision, EngineEvent};
use crate::crawler::resume::{resume_from_letter, should_dispatch, ResumePolicy};
use crate::crawler::retry::{FetchOutcome, RetryCoordinator, RetryDecision, RetryPolicy};
use crate::output::{Admission, AggregateStats, OutputAggregator};
use crate::state::{CrawlStateStore, StatusKind};
use crate::url::{classify_with, resolve_link, Level};
use crate::HarvestError;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Result of feeding one page's records to the aggregator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub accepted: usize,
    pub rejected: Vec<String>,
}

/// Counters for one pass over an event stream
#[derive(Debug, Clone, Default)]
pub struct HarvestSummary {
    /// Events applied
    pub events: u64,
    /// Lines that could not be parsed
    pub malformed: u64,
    /// Whether the stream was cut short by an interrupt
    pub interrupted: bool,
    /// Aggregate statistics after the final drain
    pub stats: AggregateStats,
}

/// Main harvest coordinator structure
#[derive(Debug)]
pub struct Coordinator {
    store: Arc<CrawlStateStore>,
    output: OutputAggregator,
    retry: RetryCoordinator,
    resume_policy: ResumePolicy,
    second_level_segments: usize,
}

impl Coordinator {
    /// Creates a new coordinator, loading existing state and output
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully opened
    /// * `Err(HarvestError)` - A directory could not be created or a persisted
    ///   file is unreadable
    pub fn open(config: &Config) -> Result<Self, HarvestError> {
        let store = Arc::new(CrawlStateStore::open(Path::new(&config.output.state_dir))?);
        let output = OutputAggregator::open(
            Path::new(&config.output.data_dir),
            config.output.flush_every,
            config.output.flush_policy,
        )?;
        let retry = RetryCoordinator::new(
            RetryPolicy::from_config(&config.crawler),
            Arc::clone(&store),
            config.crawler.second_level_segments,
        );

        if config.crawler.resume_policy == ResumePolicy::AbsenceAsSuccess {
            tracing::warn!(
                "resume-policy = absence-as-success: only URLs with a recorded failure will be dispatched"
            );
        }

        Ok(Self {
            store,
            output,
            retry,
            resume_policy: config.crawler.resume_policy,
            second_level_segments: config.crawler.second_level_segments,
        })
    }

    pub fn store(&self) -> &CrawlStateStore {
        &self.store
    }

    pub fn output(&self) -> &OutputAggregator {
        &self.output
    }

    /// Classifies a URL with the configured segment count
    pub fn classify(&self, url: &str) -> Level {
        classify_with(url, self.second_level_segments)
    }

    /// Plans the first-level (per-letter) links of a run
    ///
    /// Letters before the saved cursor are dropped, then the remaining links
    /// are filtered like any other discovered URLs.
    pub fn start_listing(&self, urls: &[String]) -> Vec<String> {
        let progress = self.store.get_progress();
        let resumed = resume_from_letter(urls, progress.current_letter.as_deref());
        tracing::info!("Found {} first-level URLs", resumed.len());
        self.filter_dispatch(Some(Level::First), resumed)
    }

    /// Filters discovered links down to the ones that should be fetched
    ///
    /// Without an explicit level each URL is classified by shape.
    pub fn filter_dispatch(&self, level: Option<Level>, urls: &[String]) -> Vec<String> {
        urls.iter()
            .filter(|url| {
                let level = level.unwrap_or_else(|| self.classify(url));
                let stored = self.store.get_status(url, level);
                let dispatch = should_dispatch(stored.as_ref(), self.resume_policy);
                if !dispatch {
                    tracing::debug!("Skipping {} URL {}", level, url);
                }
                dispatch
            })
            .cloned()
            .collect()
    }

    /// Moves the progress cursor to `letter`
    pub fn letter_started(&self, letter: &str) -> Result<(), HarvestError> {
        tracing::info!("Processing letter {}", letter);
        self.store.update_progress(Some(letter), None, None)?;
        Ok(())
    }

    /// Records the expected number of words
    pub fn set_total_words(&self, total: u64) -> Result<(), HarvestError> {
        self.store.update_progress(None, None, Some(total))?;
        Ok(())
    }

    /// Interprets a fetch outcome, recording terminal failures
    pub fn fetch_outcome(&self, outcome: &FetchOutcome) -> Result<RetryDecision, HarvestError> {
        Ok(self.retry.handle(outcome)?)
    }

    /// Validates and aggregates one record
    ///
    /// Accepted records advance `processed_words`; rejected ones change
    /// nothing.
    pub fn process_record(&self, record: Value) -> Result<Admission, HarvestError> {
        let admission = self.output.process(record)?;
        if admission.is_accepted() {
            self.store.record_processed_word()?;
        }
        Ok(admission)
    }

    /// Feeds the records extracted from `url` through the aggregator
    ///
    /// When at least one record is accepted the page counts as done and any
    /// failure recorded for it by an earlier run is cleared.
    pub fn page_extracted(
        &self,
        url: &str,
        records: Vec<Value>,
    ) -> Result<ExtractionReport, HarvestError> {
        let mut report = ExtractionReport::default();

        for record in records {
            match self.process_record(record)? {
                Admission::Accepted { .. } => report.accepted += 1,
                Admission::Rejected(reason) => report.rejected.push(reason.to_string()),
            }
        }

        if report.accepted > 0 {
            self.store
                .mark_status(url, self.classify(url), StatusKind::Success, 0)?;
        } else {
            tracing::warn!("No records accepted for {}", url);
        }

        Ok(report)
    }

    /// Applies one engine event and returns the answer for the engine
    pub fn handle_event(&self, event: EngineEvent) -> Result<Decision, HarvestError> {
        tracing::trace!("Handling {} event", event.kind());

        let decision = match event {
            EngineEvent::StartListing { urls } => Decision::Dispatch {
                urls: self.start_listing(&urls),
            },
            EngineEvent::Discovered { level, base, urls } => {
                let urls = match base {
                    Some(base) => resolve_all(&base, &urls),
                    None => urls,
                };
                Decision::Dispatch {
                    urls: self.filter_dispatch(level, &urls),
                }
            }
            EngineEvent::LetterStarted { letter } => {
                self.letter_started(&letter)?;
                Decision::Ack
            }
            EngineEvent::TotalWords { total } => {
                self.set_total_words(total)?;
                Decision::Ack
            }
            EngineEvent::FetchOutcome(outcome) => {
                let level = self.retry.level_of(&outcome);
                let verdict = self.fetch_outcome(&outcome)?;
                Decision::Fetch {
                    url: outcome.url,
                    level,
                    outcome: verdict,
                }
            }
            EngineEvent::Extracted { url, records } => {
                let report = self.page_extracted(&url, records)?;
                Decision::Extracted {
                    url,
                    accepted: report.accepted,
                    rejected: report.rejected,
                }
            }
        };

        Ok(decision)
    }

    /// Flushes all shard buffers and persists the crawl state
    ///
    /// The state store is persisted even if closing the output fails.
    pub fn shutdown(&self) -> Result<AggregateStats, HarvestError> {
        let closed = self.output.close();
        self.store.persist()?;
        let stats = closed?;

        let progress = self.store.get_progress();
        tracing::info!(
            "Harvest state saved: {} words processed, {} items total, letter {:?}",
            progress.processed_words,
            stats.total_items,
            progress.current_letter
        );
        Ok(stats)
    }
}

/// Resolves each link against `base`, dropping the ones that do not parse
fn resolve_all(base: &str, hrefs: &[String]) -> Vec<String> {
    hrefs
        .iter()
        .filter_map(|href| {
            let resolved = resolve_link(base, href);
            if resolved.is_none() {
                tracing::debug!("Dropping unresolvable link {} on {}", href, base);
            }
            resolved
        })
        .collect()
}

/// Reads engine events from `reader` and writes decisions to `writer`
///
/// Stops at end of input or as soon as `shutdown` resolves. Malformed lines
/// are answered with an error decision and do not stop the stream; storage
/// failures do. The caller is responsible for [`Coordinator::shutdown`].
pub async fn run_event_stream<R, W, S>(
    coordinator: &Coordinator,
    mut reader: R,
    mut writer: W,
    shutdown: S,
) -> Result<HarvestSummary, HarvestError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut summary = HarvestSummary::default();
    let mut line = Vec::new();
    tokio::pin!(shutdown);

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("Interrupt received, draining");
                summary.interrupted = true;
                break;
            }
            read = reader.read_until(b'\n', &mut line) => read?,
        };

        if read == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let decision = match parse_event(&line) {
            Ok(event) => {
                summary.events += 1;
                coordinator.handle_event(event)?
            }
            Err(e) => {
                summary.malformed += 1;
                tracing::warn!("Ignoring malformed event: {}", e);
                Decision::Error {
                    message: e.to_string(),
                }
            }
        };

        writer.write_all(&encode_decision(&decision)?).await?;
        writer.flush().await?;

        if summary.events % 100 == 0 && summary.events > 0 {
            let progress = coordinator.store().get_progress();
            tracing::info!(
                "Progress: {} events, {} words processed, letter {:?}",
                summary.events,
                progress.processed_words,
                progress.current_letter
            );
        }
    }

    writer.flush().await?;
    Ok(summary)
}

/// Runs a complete harvest over an event stream
///
/// This function orchestrates the whole run:
///
/// 1. Open the crawl state store and output aggregator
/// 2. Answer engine events until end of input or interrupt
/// 3. Drain: flush every shard, write stats, persist crawl state
///
/// The drain runs even when the stream fails; the stream's error is returned.
pub async fn run_harvest<R, W, S>(
    config: &Config,
    reader: R,
    writer: W,
    shutdown: S,
) -> Result<HarvestSummary, HarvestError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let coordinator = Coordinator::open(config)?;
    let streamed = run_event_stream(&coordinator, reader, writer, shutdown).await;
    let drained = coordinator.shutdown();

    match (streamed, drained) {
        (Ok(mut summary), Ok(stats)) => {
            summary.stats = stats;
            Ok(summary)
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), drained) => {
            if let Err(drain_err) = drained {
                tracing::error!("Drain after failure also failed: {}", drain_err);
            }
            Err(e)
        }
    }
}
