//! Fetch outcome interpretation
//!
//! The crawl engine reports every fetch it completes. This module decides
//! whether the engine should retry, whether the URL has reached a terminal
//! failure (and records it), or whether the page can go on to extraction.
//!
//! # Retry Logic
//!
//! | Condition                              | Action                         |
//! |----------------------------------------|--------------------------------|
//! | HTTP 2xx                               | Proceed to extraction          |
//! | `dont_retry` set                       | Terminal `failed`              |
//! | Connection / DNS / TLS / other error   | Terminal `failed`              |
//! | Timeout or retryable HTTP status       | Retry while `attempt < max`    |
//! | ... and `attempt >= max`               | Terminal `max_retries_reached` |
//! | Any other HTTP status (e.g. 404)       | Terminal `failed`              |
//!
//! Only terminal outcomes touch the crawl state store.

use crate::config::CrawlerConfig;
use crate::state::{CrawlStateStore, StatusKind};
use crate::storage::StorageResult;
use crate::url::{classify_with, Level};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// HTTP statuses retried by default
pub const DEFAULT_RETRY_HTTP_CODES: [u16; 6] = [500, 502, 503, 504, 408, 429];

/// Default retry budget per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Transport-level failure reported by the engine instead of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchError {
    Timeout,
    Connection,
    Dns,
    Tls,
    Other,
}

impl FetchError {
    /// Only timeouts are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// A completed fetch as reported by the crawl engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub url: String,

    /// Hierarchy level; derived from the URL shape when absent
    #[serde(default)]
    pub level: Option<Level>,

    /// HTTP status, when a response was received
    #[serde(default)]
    pub status: Option<u16>,

    /// Transport failure, when no usable response was received
    #[serde(default)]
    pub error: Option<FetchError>,

    /// Retries already performed for this request (0 on the first fetch)
    #[serde(default)]
    pub attempt: u32,

    /// The engine asked for this request never to be retried
    #[serde(default)]
    pub dont_retry: bool,
}

impl FetchOutcome {
    /// Builds an outcome for an HTTP response
    pub fn response(url: impl Into<String>, status: u16, attempt: u32) -> Self {
        Self {
            url: url.into(),
            level: None,
            status: Some(status),
            error: None,
            attempt,
            dont_retry: false,
        }
    }

    /// Builds an outcome for a transport failure
    pub fn failure(url: impl Into<String>, error: FetchError, attempt: u32) -> Self {
        Self {
            url: url.into(),
            level: None,
            status: None,
            error: Some(error),
            attempt,
            dont_retry: false,
        }
    }
}

/// What the engine should do with a fetch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RetryDecision {
    /// Hand the response to extraction
    Proceed,

    /// Requeue the request through the engine's own retry mechanism
    Retry { next_attempt: u32 },

    /// Give up; the outcome has been recorded in the state store
    Terminal { status: StatusKind, retry_count: u32 },
}

impl RetryDecision {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }
}

/// Retry budget and the set of retryable statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_http_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_http_codes: DEFAULT_RETRY_HTTP_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_http_codes: config.retry_http_codes.clone(),
        }
    }

    /// Decides what to do with an outcome without touching any state
    pub fn decide(&self, outcome: &FetchOutcome) -> RetryDecision {
        let failed = RetryDecision::Terminal {
            status: StatusKind::Failed,
            retry_count: 0,
        };

        let retryable = match (outcome.error, outcome.status) {
            (Some(error), _) => error.is_retryable(),
            (None, Some(status)) if (200..300).contains(&status) => {
                return RetryDecision::Proceed;
            }
            (None, Some(status)) => self.retry_http_codes.contains(&status),
            // Neither a response nor an error: nothing to retry against
            (None, None) => false,
        };

        if outcome.dont_retry || !retryable {
            return failed;
        }

        if outcome.attempt < self.max_retries {
            RetryDecision::Retry {
                next_attempt: outcome.attempt + 1,
            }
        } else {
            RetryDecision::Terminal {
                status: StatusKind::MaxRetriesReached,
                retry_count: outcome.attempt,
            }
        }
    }
}

/// Applies [`RetryPolicy`] decisions and records terminal outcomes
#[derive(Debug)]
pub struct RetryCoordinator {
    policy: RetryPolicy,
    store: Arc<CrawlStateStore>,
    second_level_segments: usize,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy, store: Arc<CrawlStateStore>, second_level_segments: usize) -> Self {
        Self {
            policy,
            store,
            second_level_segments,
        }
    }

    /// Level an outcome is recorded under
    pub fn level_of(&self, outcome: &FetchOutcome) -> Level {
        outcome
            .level
            .unwrap_or_else(|| classify_with(&outcome.url, self.second_level_segments))
    }

    /// Interprets a fetch outcome, recording it if it is terminal
    ///
    /// # Returns
    ///
    /// * `Ok(RetryDecision)` - What the engine should do next
    /// * `Err(StorageError)` - Recording a terminal outcome failed; fatal
    pub fn handle(&self, outcome: &FetchOutcome) -> StorageResult<RetryDecision> {
        let decision = self.policy.decide(outcome);
        let level = self.level_of(outcome);

        match decision {
            RetryDecision::Proceed => {
                tracing::trace!("Fetched {} URL {}", level, outcome.url);
            }
            RetryDecision::Retry { next_attempt } => {
                tracing::debug!(
                    "Retrying {} (attempt {}/{}, status {:?}, error {:?})",
                    outcome.url,
                    next_attempt,
                    self.policy.max_retries,
                    outcome.status,
                    outcome.error
                );
            }
            RetryDecision::Terminal {
                status,
                retry_count,
            } => {
                if status == StatusKind::MaxRetriesReached {
                    tracing::warn!(
                        "Giving up on {} URL {} after {} retries (status {:?}, error {:?})",
                        level,
                        outcome.url,
                        retry_count,
                        outcome.status,
                        outcome.error
                    );
                } else {
                    tracing::error!(
                        "Request failed: {} (status {:?}, error {:?})",
                        outcome.url,
                        outcome.status,
                        outcome.error
                    );
                }
                self.store
                    .mark_status(&outcome.url, level, status, retry_count)?;
            }
        }

        Ok(decision)
    }
}
