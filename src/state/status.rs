/// URL status definitions for the crawl state store
///
/// Only failures are ever stored. Success is expressed by removing a URL's
/// entry, so an absent entry means "never attempted or succeeded".
use crate::url::Level;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome recorded against a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// Fetched and extracted; clears any stored entry
    Success,

    /// Terminal failure that was not retried (transport error, 4xx, dont-retry)
    Failed,

    /// Retryable failure that exhausted its retry budget
    MaxRetriesReached,
}

impl StatusKind {
    /// Returns true if this outcome completes the URL
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Name used in `failed_urls.json` and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::MaxRetriesReached => "max_retries_reached",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored terminal outcome for one `(level, url)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlStatus {
    pub level: Level,
    pub url: String,
    pub status: StatusKind,
    pub retry_count: u32,
    pub last_update: DateTime<Utc>,
}

/// On-disk shape of a single entry; level and URL are implied by position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub status: StatusKind,
    #[serde(default)]
    pub retry_count: u32,
    pub last_update: DateTime<Utc>,
}

impl UrlStatus {
    pub(crate) fn from_stored(level: Level, url: String, entry: StoredEntry) -> Self {
        Self {
            level,
            url,
            status: entry.status,
            retry_count: entry.retry_count,
            last_update: entry.last_update,
        }
    }

    pub(crate) fn to_stored(&self) -> StoredEntry {
        StoredEntry {
            status: self.status,
            retry_count: self.retry_count,
            last_update: self.last_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_success_is_success() {
        assert!(StatusKind::Success.is_success());
        assert!(!StatusKind::Failed.is_success());
        assert!(!StatusKind::MaxRetriesReached.is_success());
    }

    #[test]
    fn test_display_matches_serde_names() {
        for kind in [
            StatusKind::Success,
            StatusKind::Failed,
            StatusKind::MaxRetriesReached,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
        assert_eq!(StatusKind::MaxRetriesReached.to_string(), "max_retries_reached");
    }

    #[test]
    fn test_stored_entry_defaults_retry_count() {
        let entry: StoredEntry =
            serde_json::from_str(r#"{"status":"failed","last_update":"2024-01-02T03:04:05Z"}"#)
                .unwrap();
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.status, StatusKind::Failed);
    }
}
