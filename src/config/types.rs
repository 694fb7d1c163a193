use crate::crawler::{ResumePolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_HTTP_CODES};
use crate::output::{FlushPolicy, DEFAULT_FLUSH_EVERY};
use crate::url::SECOND_LEVEL_SEGMENTS;
use serde::Deserialize;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Retries allowed per request before `max_retries_reached`
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// HTTP statuses worth retrying
    #[serde(rename = "retry-http-codes", default = "default_retry_http_codes")]
    pub retry_http_codes: Vec<u16>,

    /// Path segment count that marks a second-level (listing) URL
    #[serde(
        rename = "second-level-segments",
        default = "default_second_level_segments"
    )]
    pub second_level_segments: usize,

    /// How stored statuses gate re-dispatch on resume
    #[serde(rename = "resume-policy", default)]
    pub resume_policy: ResumePolicy,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_http_codes: default_retry_http_codes(),
            second_level_segments: default_second_level_segments(),
            resume_policy: ResumePolicy::default(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory for per-letter shard files and `stats.json`
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,

    /// Directory for `failed_urls.json` and `progress.json`
    #[serde(rename = "state-dir", default = "default_state_dir")]
    pub state_dir: String,

    /// Accepted records between periodic flushes
    #[serde(rename = "flush-every", default = "default_flush_every")]
    pub flush_every: u64,

    /// What the flush cadence counts
    #[serde(rename = "flush-policy", default)]
    pub flush_policy: FlushPolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_dir: default_state_dir(),
            flush_every: default_flush_every(),
            flush_policy: FlushPolicy::default(),
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_http_codes() -> Vec<u16> {
    DEFAULT_RETRY_HTTP_CODES.to_vec()
}

fn default_second_level_segments() -> usize {
    SECOND_LEVEL_SEGMENTS
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_state_dir() -> String {
    "spider_state".to_string()
}

fn default_flush_every() -> u64 {
    DEFAULT_FLUSH_EVERY
}
