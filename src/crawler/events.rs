//! Line-delimited JSON protocol spoken with the crawl engine
//!
//! The engine writes one [`EngineEvent`] per line and reads back one
//! [`Decision`] per line, in the same order.
//!
//! ```text
//! -> {"event":"fetch_outcome","url":"https://x.org/dict/english/apple","status":503}
//! <- {"decision":"fetch","url":"https://x.org/dict/english/apple","level":"word","outcome":{"action":"retry","next_attempt":1}}
//! ```

use crate::crawler::retry::{FetchOutcome, RetryDecision};
use crate::url::Level;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Something the crawl engine reports
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The first-level (per-letter) links found on the browse index
    StartListing { urls: Vec<String> },

    /// Links found on a listing page, to be filtered before dispatch
    ///
    /// With `base` set, `urls` may be relative to that page.
    Discovered {
        #[serde(default)]
        level: Option<Level>,
        #[serde(default)]
        base: Option<String>,
        urls: Vec<String>,
    },

    /// The engine moved on to a new letter
    LetterStarted { letter: String },

    /// The engine learned how many words to expect
    TotalWords { total: u64 },

    /// A fetch completed, successfully or not
    FetchOutcome(FetchOutcome),

    /// Extraction produced records for a page
    Extracted {
        url: String,
        #[serde(default)]
        records: Vec<Value>,
    },
}

impl EngineEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartListing { .. } => "start_listing",
            Self::Discovered { .. } => "discovered",
            Self::LetterStarted { .. } => "letter_started",
            Self::TotalWords { .. } => "total_words",
            Self::FetchOutcome(_) => "fetch_outcome",
            Self::Extracted { .. } => "extracted",
        }
    }
}

/// The answer written back for each event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// URLs the engine should fetch
    Dispatch { urls: Vec<String> },

    /// Event applied; nothing for the engine to do
    Ack,

    /// Retry-or-terminal verdict for a fetch outcome
    Fetch {
        url: String,
        level: Level,
        outcome: RetryDecision,
    },

    /// Accept-or-reject verdicts for a page's records
    Extracted {
        url: String,
        accepted: usize,
        rejected: Vec<String>,
    },

    /// The line could not be understood; the run continues
    Error { message: String },
}

/// Parses one protocol line
///
/// Takes raw bytes so a line that is not valid UTF-8 is reported as a parse
/// error like any other malformed line.
pub fn parse_event(line: impl AsRef<[u8]>) -> Result<EngineEvent, serde_json::Error> {
    serde_json::from_slice(line.as_ref())
}

/// Serializes a decision as one protocol line, including the newline
pub fn encode_decision(decision: &Decision) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(decision)?;
    line.push(b'\n');
    Ok(line)
}
